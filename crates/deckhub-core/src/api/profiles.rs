use crate::shared::DEVICES;
use crate::store::profiles::{PROFILE_STORES, acquire_locks_mut, get_device_profiles};

pub fn get_profiles(device: &str) -> Result<Vec<String>, anyhow::Error> {
    get_device_profiles(device)
}

pub async fn create_profile(device: String, id: String) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let dev = DEVICES
        .get(&device)
        .ok_or_else(|| anyhow::anyhow!("device {device} not found"))?;

    let store = locks.profile_stores.get_profile_store_mut(&dev, &id).await?;
    store.save()?;
    Ok(())
}

pub async fn get_selected_profile(device: String) -> Result<crate::shared::Profile, anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let dev = DEVICES
        .get(&device)
        .ok_or_else(|| anyhow::anyhow!("device {device} not found"))?;

    let selected_profile = locks.device_stores.get_selected_profile(&device)?;
    let profile = locks
        .profile_stores
        .get_profile_store(&dev, &selected_profile)?;
    Ok(profile.value.clone())
}

/// Switch the active profile of a device.
///
/// Instances of the outgoing profile receive `willDisappear` and the device
/// surface is cleared before the incoming profile's instances appear.
pub async fn set_selected_profile(device: String, id: String) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let dev = DEVICES
        .get(&device)
        .ok_or_else(|| anyhow::anyhow!("device {device} not found"))?;

    let selected_profile = locks.device_stores.get_selected_profile(&device)?;

    if selected_profile != id {
        let old_profile = &locks
            .profile_stores
            .get_profile_store(&dev, &selected_profile)?
            .value;
        for instance in old_profile
            .keys
            .iter()
            .flatten()
            .chain(old_profile.sliders.iter().flatten())
        {
            let _ = crate::events::outbound::will_appear::will_disappear(instance, false).await;
        }
        let _ = crate::events::outbound::devices::clear_screen(device.clone()).await;
    }

    // The mutable version of get_profile_store creates the store if it does not exist.
    let store = locks.profile_stores.get_profile_store_mut(&dev, &id).await?;
    let new_profile = &store.value;
    for instance in new_profile
        .keys
        .iter()
        .flatten()
        .chain(new_profile.sliders.iter().flatten())
    {
        let _ = crate::events::outbound::will_appear::will_appear(instance).await;
    }
    store.save()?;

    locks.device_stores.set_selected_profile(&device, id)?;
    crate::ui::emit(crate::ui::UiEvent::DevicesUpdated);
    Ok(())
}

pub async fn delete_profile(device: String, profile: String) {
    let mut profile_stores = PROFILE_STORES.write().await;
    profile_stores.delete_profile(&device, &profile);
}

pub async fn rename_profile(
    device: String,
    old_id: String,
    new_id: String,
) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let dev = DEVICES
        .get(&device)
        .ok_or_else(|| anyhow::anyhow!("device {device} not found"))?;

    locks
        .profile_stores
        .rename_profile(&dev, &old_id, &new_id)
        .await?;
    Ok(())
}

use super::PayloadEvent;

use crate::plugins::DEVICE_NAMESPACES;
use crate::shared::DEVICES;
use crate::store::profiles::get_device_profiles;
use crate::ui::{self, UiEvent};

use serde::Deserialize;

/// Whether a plugin may register or deregister the given device id.
///
/// The empty uuid is the broker itself; anyone else must own the id's
/// two-character namespace prefix. Ids too short to carry a prefix (or with a
/// multi-byte character across the boundary) belong to nobody.
async fn owns_device(uuid: &str, device: &str) -> bool {
    if uuid.is_empty() {
        return true;
    }
    let Some(prefix) = device.get(..2) else {
        return false;
    };
    DEVICE_NAMESPACES.read().await.get(prefix).map(String::as_str) == Some(uuid)
}

/// Register a device with the broker.
///
/// Called with an empty uuid for devices the broker drives itself, or with a
/// plugin uuid for devices owned by a device-namespace plugin.
pub async fn register_device(
    uuid: &str,
    event: PayloadEvent<crate::shared::DeviceInfo>,
) -> Result<(), anyhow::Error> {
    if owns_device(uuid, &event.payload.id).await {
        if let Ok(profiles) = get_device_profiles(&event.payload.id) {
            let mut profile_stores = crate::store::profiles::PROFILE_STORES.write().await;
            for profile in profiles {
                // Initialise the store for each profile when the device is registered.
                if let Err(e) = profile_stores
                    .get_profile_store_mut(&event.payload, &profile)
                    .await
                {
                    log::error!("{}", e);
                }
            }
        }

        let _ = crate::events::outbound::devices::device_did_connect(
            &event.payload.id,
            (&event.payload).into(),
        )
        .await;
        DEVICES.insert(event.payload.id.clone(), event.payload.clone());
        ui::emit(UiEvent::DevicesUpdated);

        let mut locks = crate::store::profiles::acquire_locks_mut().await;
        let selected_profile = locks
            .device_stores
            .get_selected_profile(&event.payload.id)?;
        let profile = locks
            .profile_stores
            .get_profile_store(&DEVICES.get(&event.payload.id).unwrap(), &selected_profile)?;
        for instance in profile
            .value
            .keys
            .iter()
            .flatten()
            .chain(profile.value.sliders.iter().flatten())
        {
            let _ = crate::events::outbound::will_appear::will_appear(instance).await;
        }

        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "plugin {uuid} is not registered for the namespace of device {}",
            event.payload.id
        ))
    }
}

pub async fn deregister_device(
    uuid: &str,
    event: PayloadEvent<String>,
) -> Result<(), anyhow::Error> {
    if owns_device(uuid, &event.payload).await {
        if !DEVICES.contains_key(&event.payload) {
            return Ok(());
        }

        let mut locks = crate::store::profiles::acquire_locks_mut().await;

        let selected_profile = locks.device_stores.get_selected_profile(&event.payload)?;
        let profile = locks
            .profile_stores
            .get_profile_store(&DEVICES.get(&event.payload).unwrap(), &selected_profile)?;
        for instance in profile
            .value
            .keys
            .iter()
            .flatten()
            .chain(profile.value.sliders.iter().flatten())
        {
            let _ = crate::events::outbound::will_appear::will_disappear(instance, false).await;
        }

        if let Ok(profiles) = get_device_profiles(&event.payload) {
            for profile in profiles {
                locks
                    .profile_stores
                    .remove_profile(&event.payload, &profile);
            }
        }

        drop(locks);

        let _ = crate::events::outbound::devices::device_did_disconnect(&event.payload).await;
        DEVICES.remove(&event.payload);
        ui::emit(UiEvent::DevicesUpdated);

        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "plugin {uuid} is not registered for the namespace of device {}",
            event.payload
        ))
    }
}

#[derive(Deserialize)]
pub struct PressPayload {
    pub device: String,
    pub position: u8,
}

pub async fn key_down(event: PayloadEvent<PressPayload>) -> Result<(), anyhow::Error> {
    crate::events::outbound::keypad::key_down(&event.payload.device, event.payload.position).await
}

pub async fn key_up(event: PayloadEvent<PressPayload>) -> Result<(), anyhow::Error> {
    crate::events::outbound::keypad::key_up(&event.payload.device, event.payload.position).await
}

#[derive(Deserialize)]
pub struct TicksPayload {
    pub device: String,
    pub position: u8,
    pub ticks: i16,
}

pub async fn encoder_change(event: PayloadEvent<TicksPayload>) -> Result<(), anyhow::Error> {
    crate::events::outbound::encoder::dial_rotate(
        &event.payload.device,
        event.payload.position,
        event.payload.ticks,
    )
    .await
}

pub async fn encoder_down(event: PayloadEvent<PressPayload>) -> Result<(), anyhow::Error> {
    crate::events::outbound::encoder::dial_press(
        &event.payload.device,
        "dialDown",
        event.payload.position,
    )
    .await
}

pub async fn encoder_up(event: PayloadEvent<PressPayload>) -> Result<(), anyhow::Error> {
    crate::events::outbound::encoder::dial_press(
        &event.payload.device,
        "dialUp",
        event.payload.position,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn odd_device_ids_from_plugins_are_rejected_without_panicking() {
        // Shorter than a namespace prefix.
        let result = register_device(
            "com.example.plugin",
            PayloadEvent {
                payload: crate::shared::DeviceInfo {
                    id: "x".to_owned(),
                    name: "Tiny".to_owned(),
                    rows: 1,
                    columns: 1,
                    encoders: 0,
                    r#type: 0,
                },
            },
        )
        .await;
        assert!(result.is_err());
        assert!(!DEVICES.contains_key("x"));

        // Multi-byte character across the prefix boundary.
        let result = deregister_device(
            "com.example.plugin",
            PayloadEvent {
                payload: "日".to_owned(),
            },
        )
        .await;
        assert!(result.is_err());
    }
}

use super::Store;

use crate::shared::{ActionInstance, DEVICES, DeviceInfo, Profile, config_dir};

use std::collections::HashMap;
use std::fs;
use std::path::Component;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

fn validate_profile_id(id: &str) -> Result<(), anyhow::Error> {
    let p = std::path::Path::new(id);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("profile id is empty"));
    }
    for c in p.components() {
        match c {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("invalid profile id"));
            }
            _ => {}
        }
    }
    Ok(())
}

pub struct ProfileStores {
    stores: HashMap<String, Store<Profile>>,
}

impl ProfileStores {
    fn canonical_id(device: &str, id: &str) -> String {
        if cfg!(target_os = "windows") {
            PathBuf::from(device)
                .join(id.replace('/', "\\"))
                .to_str()
                .unwrap()
                .to_owned()
        } else {
            PathBuf::from(device).join(id).to_str().unwrap().to_owned()
        }
    }

    pub fn get_profile_store(
        &self,
        device: &DeviceInfo,
        id: &str,
    ) -> Result<&Store<Profile>, anyhow::Error> {
        validate_profile_id(id)?;
        self.stores
            .get(&Self::canonical_id(&device.id, id))
            .ok_or_else(|| anyhow!("profile not found"))
    }

    pub async fn get_profile_store_mut(
        &mut self,
        device: &DeviceInfo,
        id: &str,
    ) -> Result<&mut Store<Profile>, anyhow::Error> {
        validate_profile_id(id)?;
        let canonical_id = Self::canonical_id(&device.id, id);
        if self.stores.contains_key(&canonical_id) {
            Ok(self.stores.get_mut(&canonical_id).unwrap())
        } else {
            let default = Profile {
                id: id.to_owned(),
                keys: Vec::new(),
                sliders: Vec::new(),
            };

            let mut store =
                Store::new(&canonical_id, &config_dir().join("profiles"), default).context(
                    format!("Failed to create store for profile {}", canonical_id),
                )?;
            // Size slots to the device geometry.
            let key_count = (device.rows * device.columns) as usize;
            store.value.keys.resize(key_count, None);
            store.value.sliders.resize(device.encoders as usize, None);

            // Drop instances whose plugin no longer exists, or whose action is
            // no longer provided by a registered plugin.
            let categories = crate::shared::CATEGORIES.read().await;
            let actions = categories
                .values()
                .flat_map(|v| v.actions.iter())
                .collect::<Vec<_>>();
            let plugins_dir = config_dir().join("plugins");
            let registered = crate::events::registered_plugins().await;
            let keep_instance = |instance: &ActionInstance| -> bool {
                plugins_dir.join(&instance.action.plugin).exists()
                    && (!registered.contains(&instance.action.plugin)
                        || actions.iter().any(|v| v.uuid == instance.action.uuid))
            };
            for slot in store
                .value
                .keys
                .iter_mut()
                .chain(store.value.sliders.iter_mut())
            {
                if let Some(instance) = slot
                    && !keep_instance(instance)
                {
                    *slot = None;
                }
            }
            store.save()?;

            self.stores.insert(canonical_id.clone(), store);
            Ok(self.stores.get_mut(&canonical_id).unwrap())
        }
    }

    pub fn remove_profile(&mut self, device: &str, id: &str) {
        if validate_profile_id(id).is_err() {
            return;
        }
        self.stores.remove(&Self::canonical_id(device, id));
    }

    pub fn delete_profile(&mut self, device: &str, id: &str) {
        if validate_profile_id(id).is_err() {
            return;
        }
        self.remove_profile(device, id);
        let config_dir = config_dir();
        #[cfg(target_os = "windows")]
        let id = &id.replace('/', "\\");
        let path = config_dir
            .join("profiles")
            .join(device)
            .join(format!("{id}.json"));
        let _ = fs::remove_file(&path);
        // This is safe as `remove_dir` errors if the directory is not empty.
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    pub async fn rename_profile(
        &mut self,
        device: &DeviceInfo,
        old_id: &str,
        new_id: &str,
    ) -> Result<(), anyhow::Error> {
        validate_profile_id(old_id)?;
        validate_profile_id(new_id)?;
        // Remove from the store but don't delete the file
        self.remove_profile(&device.id, old_id);

        let config_dir = config_dir();

        #[cfg(target_os = "windows")]
        let old_path_id = old_id.replace('/', "\\");
        #[cfg(not(target_os = "windows"))]
        let old_path_id = old_id;

        #[cfg(target_os = "windows")]
        let new_path_id = new_id.replace('/', "\\");
        #[cfg(not(target_os = "windows"))]
        let new_path_id = new_id;

        let old_path = config_dir
            .join("profiles")
            .join(&device.id)
            .join(format!("{}.json", old_path_id));
        let new_path = config_dir
            .join("profiles")
            .join(&device.id)
            .join(format!("{}.json", new_path_id));

        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::rename(&old_path, &new_path)?;

        // Clean up empty old directory if profile was in a folder
        if let Some(parent) = old_path.parent() {
            // This is safe as `remove_dir` errors if the directory is not empty.
            let _ = fs::remove_dir(parent);
        }

        // Reload under the new id, rewriting instance contexts as we go.
        let store = self.get_profile_store_mut(device, new_id).await?;
        store.value.id = new_id.to_owned();
        for slot in store
            .value
            .keys
            .iter_mut()
            .chain(store.value.sliders.iter_mut())
        {
            if let Some(instance) = slot {
                instance.context.profile = new_id.to_owned();
            }
        }
        store.save()?;

        Ok(())
    }

    pub fn all_from_plugin(&self, plugin: &str) -> Vec<crate::shared::ActionContext> {
        let mut all = vec![];
        for store in self.stores.values() {
            for instance in store
                .value
                .keys
                .iter()
                .flatten()
                .chain(store.value.sliders.iter().flatten())
            {
                if instance.action.plugin == plugin {
                    all.push(instance.context.clone());
                }
            }
        }
        all
    }
}

#[derive(Serialize, Deserialize)]
pub struct DeviceConfig {
    pub selected_profile: String,
}

impl super::NotProfile for DeviceConfig {}

pub struct DeviceStores {
    stores: HashMap<String, Store<DeviceConfig>>,
}

impl DeviceStores {
    pub fn get_selected_profile(&mut self, device: &str) -> Result<String, anyhow::Error> {
        if !self.stores.contains_key(device) {
            let default = DeviceConfig {
                selected_profile: "Default".to_owned(),
            };

            let store = Store::new(device, &config_dir().join("profiles"), default).context(
                format!("Failed to create store for device config {}", device),
            )?;
            store.save()?;

            self.stores.insert(device.to_owned(), store);
        }

        let from_store = &self.stores.get(device).unwrap().value.selected_profile;
        let all = get_device_profiles(device)?;
        if all.contains(from_store) {
            Ok(from_store.clone())
        } else {
            Ok(all.first().unwrap().clone())
        }
    }

    pub fn set_selected_profile(&mut self, device: &str, id: String) -> Result<(), anyhow::Error> {
        if self.stores.contains_key(device) {
            let store = self.stores.get_mut(device).unwrap();
            store.value.selected_profile = id;
            store.save()?;
        } else {
            let default = DeviceConfig {
                selected_profile: id,
            };

            let store = Store::new(device, &config_dir().join("profiles"), default).context(
                format!("Failed to create store for device config {}", device),
            )?;
            store.save()?;

            self.stores.insert(device.to_owned(), store);
        }
        Ok(())
    }
}

pub fn get_device_profiles(device: &str) -> Result<Vec<String>, anyhow::Error> {
    let mut profiles: Vec<String> = vec![];

    let device_path = config_dir().join("profiles").join(device);
    fs::create_dir_all(&device_path)?;
    let entries = fs::read_dir(device_path)?;

    for entry in entries.flatten() {
        if entry.metadata()?.is_file() {
            let mut id = entry.file_name().to_string_lossy().into_owned();
            if id.ends_with(".json") {
                id.truncate(id.len() - 5);
            } else if id.ends_with(".json.bak") {
                id.truncate(id.len() - 9);
            } else if id.ends_with(".json.temp") {
                id.truncate(id.len() - 10);
            } else {
                continue;
            }
            profiles.push(id);
        } else if entry.metadata()?.is_dir() {
            let entries = fs::read_dir(entry.path())?;
            for subentry in entries.flatten() {
                if subentry.metadata()?.is_file() {
                    let mut id = format!(
                        "{}/{}",
                        entry.file_name().to_string_lossy(),
                        &subentry.file_name().to_string_lossy()
                    );
                    if id.ends_with(".json") {
                        id.truncate(id.len() - 5);
                    } else if id.ends_with(".json.bak") {
                        id.truncate(id.len() - 9);
                    } else if id.ends_with(".json.temp") {
                        id.truncate(id.len() - 10);
                    } else {
                        continue;
                    }
                    profiles.push(id);
                }
            }
        }
    }

    if profiles.is_empty() {
        profiles.push("Default".to_owned());
    }

    Ok(profiles)
}

/// A singleton object to contain all active Store instances that hold a profile.
pub static PROFILE_STORES: Lazy<RwLock<ProfileStores>> = Lazy::new(|| {
    RwLock::new(ProfileStores {
        stores: HashMap::new(),
    })
});

/// A singleton object to manage Store instances for device configurations.
pub static DEVICE_STORES: Lazy<RwLock<DeviceStores>> = Lazy::new(|| {
    RwLock::new(DeviceStores {
        stores: HashMap::new(),
    })
});

pub struct Locks<'a> {
    #[allow(dead_code)]
    pub device_stores: RwLockReadGuard<'a, DeviceStores>,
    pub profile_stores: RwLockReadGuard<'a, ProfileStores>,
}

pub async fn acquire_locks() -> Locks<'static> {
    let device_stores = DEVICE_STORES.read().await;
    let profile_stores = PROFILE_STORES.read().await;
    Locks {
        device_stores,
        profile_stores,
    }
}

pub struct LocksMut<'a> {
    pub device_stores: RwLockWriteGuard<'a, DeviceStores>,
    pub profile_stores: RwLockWriteGuard<'a, ProfileStores>,
}

pub async fn acquire_locks_mut() -> LocksMut<'static> {
    let device_stores = DEVICE_STORES.write().await;
    let profile_stores = PROFILE_STORES.write().await;
    LocksMut {
        device_stores,
        profile_stores,
    }
}

pub async fn get_slot<'a>(
    context: &crate::shared::Context,
    locks: &'a Locks<'_>,
) -> Result<&'a Option<crate::shared::ActionInstance>, anyhow::Error> {
    let device = DEVICES
        .get(&context.device)
        .ok_or_else(|| anyhow!("device not found"))?;
    let store = locks
        .profile_stores
        .get_profile_store(&device, &context.profile)?;

    let configured = match &context.controller[..] {
        "Encoder" => store
            .value
            .sliders
            .get(context.position as usize)
            .ok_or_else(|| anyhow!("index out of bounds"))?,
        _ => store
            .value
            .keys
            .get(context.position as usize)
            .ok_or_else(|| anyhow!("index out of bounds"))?,
    };

    Ok(configured)
}

pub async fn get_slot_mut<'a>(
    context: &crate::shared::Context,
    locks: &'a mut LocksMut<'_>,
) -> Result<&'a mut Option<crate::shared::ActionInstance>, anyhow::Error> {
    let device = DEVICES
        .get(&context.device)
        .ok_or_else(|| anyhow!("device not found"))?;
    let store = locks
        .profile_stores
        .get_profile_store_mut(&device, &context.profile)
        .await?;

    // Keep slots sized to the device geometry.
    let key_count = (device.rows * device.columns) as usize;
    store.value.keys.resize(key_count, None);
    store.value.sliders.resize(device.encoders as usize, None);

    let configured = match &context.controller[..] {
        "Encoder" => store
            .value
            .sliders
            .get_mut(context.position as usize)
            .ok_or_else(|| anyhow!("index out of bounds"))?,
        _ => store
            .value
            .keys
            .get_mut(context.position as usize)
            .ok_or_else(|| anyhow!("index out of bounds"))?,
    };

    Ok(configured)
}

pub async fn get_instance<'a>(
    context: &crate::shared::ActionContext,
    locks: &'a Locks<'_>,
) -> Result<Option<&'a crate::shared::ActionInstance>, anyhow::Error> {
    let slot = get_slot(&(context.into()), locks).await?;
    if let Some(instance) = slot
        && instance.context == *context
    {
        return Ok(Some(instance));
    }
    Ok(None)
}

pub async fn get_instance_mut<'a>(
    context: &crate::shared::ActionContext,
    locks: &'a mut LocksMut<'_>,
) -> Result<Option<&'a mut crate::shared::ActionInstance>, anyhow::Error> {
    let slot = get_slot_mut(&(context.into()), locks).await?;
    if let Some(instance) = slot
        && instance.context == *context
    {
        return Ok(Some(instance));
    }
    Ok(None)
}

/// Persist the named profile of a device.
///
/// Callers pass the profile the mutated instance lives in, which is not
/// necessarily the device's selected profile.
pub async fn save_profile(
    device: &str,
    profile: &str,
    locks: &mut LocksMut<'_>,
) -> Result<(), anyhow::Error> {
    let device = DEVICES
        .get(device)
        .ok_or_else(|| anyhow!("device not found"))?;
    let store = locks.profile_stores.get_profile_store(&device, profile)?;
    store.save()
}

#[cfg(test)]
mod tests {
    use super::validate_profile_id;

    #[tokio::test]
    async fn save_profile_persists_the_touched_profile() {
        let dir = tempfile::tempdir().unwrap();
        crate::shared::init_paths(crate::shared::Paths {
            config_dir: dir.path().to_owned(),
            data_dir: dir.path().to_owned(),
            log_dir: dir.path().to_owned(),
            resource_dir: None,
        });

        let device = crate::shared::DeviceInfo {
            id: "ts-unit".to_owned(),
            name: "Test".to_owned(),
            rows: 1,
            columns: 2,
            encoders: 0,
            r#type: 0,
        };
        super::DEVICES.insert(device.id.clone(), device.clone());

        let mut locks = super::acquire_locks_mut().await;
        locks
            .device_stores
            .set_selected_profile(&device.id, "A".to_owned())
            .unwrap();
        locks
            .profile_stores
            .get_profile_store_mut(&device, "A")
            .await
            .unwrap();

        // Mutate a profile that is not the selected one.
        let store = locks
            .profile_stores
            .get_profile_store_mut(&device, "B")
            .await
            .unwrap();
        store.value.id = "Mutated".to_owned();
        super::save_profile(&device.id, "B", &mut locks).await.unwrap();

        let on_disk =
            std::fs::read_to_string(dir.path().join("profiles/ts-unit/B.json")).unwrap();
        assert!(on_disk.contains("Mutated"));
        let selected =
            std::fs::read_to_string(dir.path().join("profiles/ts-unit/A.json")).unwrap();
        assert!(!selected.contains("Mutated"));

        super::DEVICES.remove(&device.id);
    }

    #[test]
    fn profile_id_validation_allows_folders_but_not_traversal() {
        assert!(validate_profile_id("Default").is_ok());
        assert!(validate_profile_id("Folder/Profile").is_ok());

        assert!(validate_profile_id("").is_err());
        assert!(validate_profile_id("../evil").is_err());
        assert!(validate_profile_id("Folder/../evil").is_err());
        assert!(validate_profile_id("/abs").is_err());
    }
}

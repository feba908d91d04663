//! Host-facing operations for attached frontends.

pub mod instances;
pub mod profiles;
pub mod property_inspector;
pub mod settings;

use crate::shared::{CATEGORIES, Category, DEVICES, DeviceInfo};

use std::collections::HashMap;

pub fn get_devices() -> dashmap::DashMap<String, DeviceInfo> {
    DEVICES.clone()
}

pub async fn get_categories() -> HashMap<String, Category> {
    CATEGORIES.read().await.clone()
}

pub async fn get_localisations(
    locale: &str,
) -> Result<HashMap<String, serde_json::Value>, anyhow::Error> {
    let mut localisations: HashMap<String, serde_json::Value> = HashMap::new();

    let mut entries = tokio::fs::read_dir(&crate::shared::config_dir().join("plugins")).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = match entry.metadata().await?.is_symlink() {
            true => tokio::fs::read_link(entry.path()).await?,
            false => entry.path(),
        };
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            let Ok(locale_bytes) = tokio::fs::read(path.join(format!("{locale}.json"))).await
            else {
                continue;
            };
            let Ok(locale): Result<serde_json::Value, _> = serde_json::from_slice(&locale_bytes)
            else {
                continue;
            };
            localisations.insert(entry.file_name().to_string_lossy().into_owned(), locale);
        }
    }

    Ok(localisations)
}

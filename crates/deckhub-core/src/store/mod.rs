pub mod profiles;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

pub(crate) fn write_atomic_bytes(path: &Path, contents: &[u8]) -> Result<(), anyhow::Error> {
    fs::create_dir_all(path.parent().unwrap())?;

    let temp_path = path.with_extension("json.temp");
    let backup_path = path.with_extension("json.bak");

    if let Ok(meta) = fs::symlink_metadata(&temp_path)
        && meta.file_type().is_symlink()
    {
        return Err(anyhow::anyhow!("refusing to write to symlinked temp file"));
    }
    if let Ok(meta) = fs::symlink_metadata(&backup_path)
        && meta.file_type().is_symlink()
    {
        return Err(anyhow::anyhow!(
            "refusing to write to symlinked backup file"
        ));
    }
    if let Ok(meta) = fs::symlink_metadata(path)
        && meta.file_type().is_symlink()
    {
        return Err(anyhow::anyhow!(
            "refusing to overwrite symlinked store file"
        ));
    }

    // Write to temporary file
    let mut temp_file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    FileExt::lock_exclusive(&temp_file)?;
    temp_file.write_all(contents)?;
    temp_file.sync_all()?;
    FileExt::unlock(&temp_file)?;
    drop(temp_file);

    // If main file exists, back it up
    if path.exists() {
        fs::rename(path, &backup_path)?;
    }

    // Rename temp file to main file
    fs::rename(&temp_path, path)?;

    // Remove backup file if everything succeeded
    if backup_path.exists() {
        let _ = fs::remove_file(&backup_path);
    }

    Ok(())
}

pub trait FromAndIntoDiskValue
where
    Self: Sized,
{
    #[allow(clippy::wrong_self_convention)]
    fn into_value(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn from_value(_: serde_json::Value, _: &Path) -> Result<Self, serde_json::Error>;
}

pub trait NotProfile {}

impl<T> FromAndIntoDiskValue for T
where
    T: Serialize + for<'a> Deserialize<'a> + NotProfile,
{
    fn into_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
    fn from_value(value: serde_json::Value, _: &Path) -> Result<T, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Allows for easy persistence of values using JSON files
pub struct Store<T>
where
    T: FromAndIntoDiskValue,
{
    pub value: T,
    path: PathBuf,
}

impl<T> Store<T>
where
    T: FromAndIntoDiskValue,
{
    /// Validate that a file contains valid data for type T
    fn validate_file_contents(path: &Path) -> Result<T, anyhow::Error> {
        if let Ok(meta) = fs::symlink_metadata(path)
            && meta.file_type().is_symlink()
        {
            return Err(anyhow::anyhow!("refusing to read symlinked store file"));
        }
        let file_contents = fs::read(path)?;
        let value: T = T::from_value(serde_json::from_slice(&file_contents)?, path)?;
        Ok(value)
    }

    /// Create a new Store given an ID and storage directory
    pub fn new(id: &str, config_dir: &Path, default: T) -> Result<Self, anyhow::Error> {
        let path = config_dir.join(format!("{}.json", id));
        let temp_path = path.with_extension("json.temp");
        let backup_path = path.with_extension("json.bak");

        if let Ok(value) = Self::validate_file_contents(&path) {
            let _ = fs::remove_file(&temp_path);
            let _ = fs::remove_file(&backup_path);
            Ok(Self { path, value })
        } else if let Ok(value) = Self::validate_file_contents(&temp_path) {
            fs::rename(&temp_path, &path)?;
            Ok(Self { path, value })
        } else if let Ok(value) = Self::validate_file_contents(&backup_path) {
            fs::rename(&backup_path, &path)?;
            Ok(Self { path, value })
        } else {
            Ok(Self {
                path,
                value: default,
            })
        }
    }

    /// Save the relevant Store as a file
    pub fn save(&self) -> Result<(), anyhow::Error> {
        let value = T::into_value(&self.value)?;
        let bytes = serde_json::to_vec(&value)?;
        write_atomic_bytes(&self.path, &bytes)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    pub language: String,
    pub brightness: u8,
    /// Port the plugin WebSocket listener binds to.
    pub plugin_port: u16,
    /// Port the property inspector WebSocket listener binds to.
    pub property_inspector_port: u16,
    pub separatewine: bool,
    pub developer: bool,
    /// Plugin IDs (folder names) that should not be launched at startup.
    pub disabled_plugins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "0.0.0".to_owned(),
            language: "en".to_owned(),
            brightness: 50,
            plugin_port: 57116,
            property_inspector_port: 57117,
            separatewine: false,
            developer: false,
            disabled_plugins: vec![],
        }
    }
}

impl NotProfile for Settings {}

// Profiles carry their id inline, so the plain serde round trip applies.
impl NotProfile for crate::shared::Profile {}

pub fn get_settings() -> Result<Store<Settings>, anyhow::Error> {
    Store::new(
        "settings",
        &crate::shared::config_dir(),
        Settings::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
    struct Doc {
        count: u32,
    }
    impl NotProfile for Doc {}

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new("doc", dir.path(), Doc::default()).unwrap();
        store.value.count = 7;
        store.save().unwrap();

        let reloaded: Store<Doc> = Store::new("doc", dir.path(), Doc::default()).unwrap();
        assert_eq!(reloaded.value, Doc { count: 7 });
    }

    #[test]
    fn recovers_from_leftover_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("doc.json.temp"), r#"{"count":3}"#).unwrap();

        let store: Store<Doc> = Store::new("doc", dir.path(), Doc::default()).unwrap();
        assert_eq!(store.value, Doc { count: 3 });
        assert!(dir.path().join("doc.json").exists());
    }

    #[test]
    fn recovers_from_backup_when_main_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("doc.json"), "{not json").unwrap();
        fs::write(dir.path().join("doc.json.bak"), r#"{"count":9}"#).unwrap();

        let store: Store<Doc> = Store::new("doc", dir.path(), Doc::default()).unwrap();
        assert_eq!(store.value, Doc { count: 9 });
    }

    #[test]
    fn profiles_persist_like_any_other_store() {
        let dir = tempfile::tempdir().unwrap();
        let default = || crate::shared::Profile {
            id: "Default".to_owned(),
            keys: vec![None, None],
            sliders: vec![],
        };

        let mut store = Store::new("profile", dir.path(), default()).unwrap();
        store.value.id = "Renamed".to_owned();
        store.save().unwrap();

        let reloaded: Store<crate::shared::Profile> =
            Store::new("profile", dir.path(), default()).unwrap();
        assert_eq!(reloaded.value.id, "Renamed");
        assert_eq!(reloaded.value.keys.len(), 2);
    }

    #[test]
    fn falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: Store<Doc> = Store::new("doc", dir.path(), Doc::default()).unwrap();
        assert_eq!(store.value, Doc::default());
    }
}

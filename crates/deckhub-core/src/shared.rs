use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Deserializer, Serialize, de::Visitor};
use serde_inline_default::serde_inline_default;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use tokio::sync::RwLock;

pub const PRODUCT_NAME: &str = "DeckHub";
pub const APP_ID: &str = "io.github.deckhub";

#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Optional directory containing bundled resources (e.g. builtin plugins).
    pub resource_dir: Option<PathBuf>,
}

static PATHS: OnceCell<Paths> = OnceCell::new();

pub fn init_paths(paths: Paths) {
    let _ = PATHS.set(paths);
}

pub fn discover_paths() -> anyhow::Result<Paths> {
    let base =
        BaseDirs::new().ok_or_else(|| anyhow::anyhow!("failed to determine base directories"))?;

    let config_dir = base.config_dir().join(APP_ID);
    let data_dir = base.data_dir().join(APP_ID);
    let log_dir = data_dir.join("logs");

    Ok(Paths {
        config_dir,
        data_dir,
        log_dir,
        resource_dir: None,
    })
}

fn paths() -> &'static Paths {
    PATHS
        .get()
        .expect("deckhub-core paths not initialised; call shared::init_paths() early in main()")
}

/// Get the application configuration directory.
pub fn config_dir() -> PathBuf {
    paths().config_dir.clone()
}

/// Get the application log directory.
pub fn log_dir() -> PathBuf {
    paths().log_dir.clone()
}

/// Get the application data directory.
pub fn data_dir() -> PathBuf {
    paths().data_dir.clone()
}

pub fn resource_dir() -> Option<PathBuf> {
    paths().resource_dir.clone()
}

/// Metadata of a device.
#[serde_inline_default]
#[derive(Clone, Deserialize, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub rows: u8,
    pub columns: u8,
    pub encoders: u8,
    pub r#type: u8,
}

pub static DEVICES: Lazy<DashMap<String, DeviceInfo>> = Lazy::new(DashMap::new);

/// Convert an icon specified in a plugin manifest to its full path.
pub fn convert_icon(path: String) -> String {
    let lower = path.to_lowercase();
    if lower.ends_with(".png")
        || lower.ends_with(".jpg")
        || lower.ends_with(".jpeg")
        || lower.ends_with(".gif")
        || lower.ends_with(".bmp")
        || lower.ends_with(".webp")
    {
        return path;
    }

    // Many plugins omit the extension in their manifest; prefer the high-DPI
    // variant when present.
    if Path::new(&(path.clone() + "@2x.png")).exists() {
        path + "@2x.png"
    } else if Path::new(&(path.clone() + ".png")).exists() {
        path + ".png"
    } else if Path::new(&(path.clone() + ".jpg")).exists() {
        path + ".jpg"
    } else {
        path + ".png"
    }
}

#[derive(Clone, Copy, Serialize)]
pub struct FontSize(pub u16);
impl<'de> Deserialize<'de> for FontSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MyVisitor;

        impl Visitor<'_> for MyVisitor {
            type Value = FontSize;

            fn expecting(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                fmt.write_str("integer or string")
            }

            fn visit_u64<E>(self, val: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FontSize(val as u16))
            }

            fn visit_str<E>(self, val: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match val.parse::<u64>() {
                    Ok(val) => self.visit_u64(val),
                    Err(_) => Err(E::custom("failed to parse integer")),
                }
            }
        }

        deserializer.deserialize_any(MyVisitor)
    }
}

/// A state of an action.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionState {
    #[serde(alias = "Image")]
    pub image: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Title")]
    pub text: String,
    #[serde(alias = "ShowTitle")]
    pub show: bool,
    #[serde(alias = "TitleColor")]
    pub colour: String,
    #[serde(alias = "TitleAlignment")]
    pub alignment: String,
    #[serde(alias = "FontFamily")]
    pub family: String,
    #[serde(alias = "FontStyle")]
    pub style: String,
    #[serde(alias = "FontSize")]
    pub size: FontSize,
    #[serde(alias = "FontUnderline")]
    pub underline: bool,
}

impl Default for ActionState {
    fn default() -> Self {
        Self {
            image: "actionDefaultImage".to_owned(),
            name: String::new(),
            text: String::new(),
            show: true,
            colour: "#FFFFFF".to_owned(),
            alignment: "middle".to_owned(),
            family: "Liberation Sans".to_owned(),
            style: "Regular".to_owned(),
            size: FontSize(16),
            underline: false,
        }
    }
}

#[serde_inline_default]
#[derive(Clone, Serialize, Deserialize)]
pub struct Category {
    pub icon: Option<String>,
    pub actions: Vec<Action>,
}

/// An action, deserialised from the plugin manifest.
#[serde_inline_default]
#[derive(Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(alias = "UUID")]
    pub uuid: String,

    #[serde_inline_default(String::new())]
    pub plugin: String,

    #[serde_inline_default(String::new())]
    #[serde(alias = "Tooltip")]
    pub tooltip: String,

    #[serde_inline_default(String::new())]
    #[serde(alias = "Icon")]
    pub icon: String,

    #[serde_inline_default(false)]
    #[serde(alias = "DisableAutomaticStates")]
    pub disable_automatic_states: bool,

    #[serde_inline_default(true)]
    #[serde(alias = "VisibleInActionsList")]
    pub visible_in_action_list: bool,

    #[serde_inline_default(String::new())]
    #[serde(alias = "PropertyInspectorPath")]
    pub property_inspector: String,

    #[serde_inline_default(vec!["Keypad".to_owned()])]
    #[serde(alias = "Controllers")]
    pub controllers: Vec<String>,

    #[serde(alias = "States")]
    pub states: Vec<ActionState>,
}

/// Location metadata of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub device: String,
    pub profile: String,
    pub controller: String,
    pub position: u8,
}

/// Information about the slot and index an instance is located in.
#[derive(
    Debug, Clone, PartialEq, Eq, serde_with::SerializeDisplay, serde_with::DeserializeFromStr,
)]
pub struct ActionContext {
    pub device: String,
    pub profile: String,
    pub controller: String,
    pub position: u8,
    pub index: u16,
}

impl std::fmt::Display for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.device, self.profile, self.controller, self.position, self.index
        )
    }
}

impl std::str::FromStr for ActionContext {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() < 5 {
            return Err(anyhow::anyhow!("not enough segments"));
        }
        // Device and profile identifiers may themselves contain separators;
        // the trailing three segments are unambiguous.
        let index = u16::from_str(segments[segments.len() - 1])?;
        let position = u8::from_str(segments[segments.len() - 2])?;
        let controller = segments[segments.len() - 3].to_owned();
        let device = segments[0].to_owned();
        let profile = segments[1..segments.len() - 3].join(".");
        Ok(Self {
            device,
            profile,
            controller,
            position,
            index,
        })
    }
}

impl ActionContext {
    pub fn from_context(context: Context, index: u16) -> Self {
        Self {
            device: context.device,
            profile: context.profile,
            controller: context.controller,
            position: context.position,
            index,
        }
    }
}

impl From<ActionContext> for Context {
    fn from(value: ActionContext) -> Self {
        Self {
            device: value.device,
            profile: value.profile,
            controller: value.controller,
            position: value.position,
        }
    }
}

impl From<&ActionContext> for Context {
    fn from(value: &ActionContext) -> Self {
        Self::from(value.clone())
    }
}

/// An instance of an action.
#[derive(Clone, Serialize, Deserialize)]
pub struct ActionInstance {
    pub action: Action,
    pub context: ActionContext,
    pub states: Vec<ActionState>,
    pub current_state: u16,
    pub settings: serde_json::Value,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub keys: Vec<Option<ActionInstance>>,
    pub sliders: Vec<Option<ActionInstance>>,
}

/// A map of category names to a list of actions in that category.
pub static CATEGORIES: Lazy<RwLock<HashMap<String, Category>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn action_context_round_trip() {
        let context = ActionContext {
            device: "sd-ABC123".to_owned(),
            profile: "Default".to_owned(),
            controller: "Keypad".to_owned(),
            position: 4,
            index: 0,
        };
        let formatted = context.to_string();
        assert_eq!(formatted, "sd-ABC123.Default.Keypad.4.0");
        assert_eq!(ActionContext::from_str(&formatted).unwrap(), context);
    }

    #[test]
    fn action_context_profile_with_separator() {
        let parsed = ActionContext::from_str("pk-00:11:22.my.profile.Encoder.1.0").unwrap();
        assert_eq!(parsed.device, "pk-00:11:22");
        assert_eq!(parsed.profile, "my.profile");
        assert_eq!(parsed.controller, "Encoder");
        assert_eq!(parsed.position, 1);
        assert_eq!(parsed.index, 0);
    }

    #[test]
    fn action_context_rejects_short_input() {
        assert!(ActionContext::from_str("dev.profile.Keypad.1").is_err());
        assert!(ActionContext::from_str("").is_err());
    }
}

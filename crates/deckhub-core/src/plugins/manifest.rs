use std::collections::HashMap;

use crate::shared::Action;

use anyhow::Context as _;
use serde::Deserialize;
use serde_inline_default::serde_inline_default;

#[derive(Debug, Deserialize)]
pub struct OS {
    #[serde(alias = "Platform")]
    pub platform: String,
}

#[allow(dead_code)]
#[serde_inline_default]
#[derive(Deserialize)]
pub struct PluginManifest {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(alias = "Author")]
    pub author: String,

    #[serde(alias = "Version")]
    pub version: String,

    #[serde(alias = "Icon")]
    pub icon: String,

    #[serde_inline_default("Custom".to_owned())]
    #[serde(alias = "Category")]
    pub category: String,

    #[serde(alias = "CategoryIcon")]
    pub category_icon: Option<String>,

    #[serde(alias = "Actions")]
    pub actions: Vec<Action>,

    #[serde(alias = "OS")]
    pub os: Vec<OS>,

    #[serde(alias = "CodePath")]
    pub code_path: Option<String>,

    #[serde(alias = "CodePathWin")]
    pub code_path_windows: Option<String>,

    #[serde(alias = "CodePathMac")]
    pub code_path_macos: Option<String>,

    #[serde(alias = "CodePathLin")]
    pub code_path_linux: Option<String>,

    #[serde(alias = "PropertyInspectorPath")]
    pub property_inspector_path: Option<String>,

    #[serde(alias = "DeviceNamespace")]
    pub device_namespace: Option<String>,

    #[serde(alias = "ApplicationsToMonitor")]
    pub applications_to_monitor: Option<HashMap<String, Vec<String>>>,
}

/// Decode manifest bytes into a JSON string.
///
/// Manifests in the wild ship as UTF-8 (with or without a BOM) or UTF-16;
/// tooling on Windows is the usual source of the latter.
fn decode_manifest(bytes: &[u8]) -> anyhow::Result<String> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(bytes[3..].to_vec())
            .context("manifest is not valid UTF-8 (after UTF-8 BOM)");
    }

    let decode_utf16 = |le: bool, data: &[u8]| -> anyhow::Result<String> {
        // Tolerate a trailing NUL byte.
        let data = if data.len() % 2 != 0 {
            if data.last() == Some(&0) {
                &data[..data.len() - 1]
            } else {
                return Err(anyhow::anyhow!("manifest UTF-16 payload has odd length"));
            }
        } else {
            data
        };

        let mut units = Vec::with_capacity(data.len() / 2);
        for chunk in data.chunks_exact(2) {
            units.push(if le {
                u16::from_le_bytes([chunk[0], chunk[1]])
            } else {
                u16::from_be_bytes([chunk[0], chunk[1]])
            });
        }
        String::from_utf16(&units).context("manifest is not valid UTF-16")
    };

    if bytes.starts_with(&[0xFF, 0xFE]) {
        return decode_utf16(true, &bytes[2..]);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16(false, &bytes[2..]);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_owned());
    }

    // No BOM, not UTF-8: BOM-less UTF-16 shows up as NULs interleaved with
    // ASCII-ish JSON. Guess the byte order from where the NULs land.
    let looks_utf16ish = (bytes.len() >= 2 && bytes[0] == b'{' && bytes[1] == 0)
        || (bytes.len() >= 2 && bytes[0] == 0 && bytes[1] == b'{');
    if looks_utf16ish {
        let le_guess = bytes.get(1) == Some(&0);
        if let Ok(s) = decode_utf16(le_guess, bytes) {
            return Ok(s);
        }
        if let Ok(s) = decode_utf16(!le_guess, bytes) {
            return Ok(s);
        }
    }

    Err(anyhow::anyhow!(
        "manifest encoding unsupported (not UTF-8/UTF-16)"
    ))
}

pub fn read_manifest(base_path: &std::path::Path) -> Result<PluginManifest, anyhow::Error> {
    let raw = std::fs::read(base_path.join("manifest.json")).context("failed to read manifest")?;
    let text = decode_manifest(&raw)?;
    let text = text.trim_start_matches('\u{feff}');
    serde_json::from_str(text).context("failed to parse manifest")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "Name": "Example",
        "Author": "Someone",
        "Version": "1.2.0",
        "Icon": "icon",
        "Actions": [
            {
                "Name": "Toggle",
                "UUID": "com.example.plugin.toggle",
                "States": [{}, {}]
            }
        ],
        "OS": [{"Platform": "linux"}, {"Platform": "windows"}],
        "CodePath": "plugin",
        "CodePathWin": "plugin.exe"
    }"#;

    #[test]
    fn pascal_case_aliases_parse() {
        let manifest: PluginManifest = serde_json::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.name, "Example");
        assert_eq!(manifest.category, "Custom");
        assert_eq!(manifest.actions.len(), 1);
        assert_eq!(manifest.actions[0].states.len(), 2);
        assert_eq!(manifest.os.len(), 2);
        assert_eq!(manifest.code_path_windows.as_deref(), Some("plugin.exe"));
    }

    #[test]
    fn utf16_manifests_decode() {
        let utf16: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain(MANIFEST.encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        let text = decode_manifest(&utf16).unwrap();
        let manifest: PluginManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest.version, "1.2.0");
    }

    #[test]
    fn bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(MANIFEST.as_bytes());
        let text = decode_manifest(&bytes).unwrap();
        assert!(serde_json::from_str::<PluginManifest>(&text).is_ok());
    }
}

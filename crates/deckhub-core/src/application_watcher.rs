//! Notifies plugins when applications they declared in their manifest launch
//! or terminate, and detects system wake-ups through gaps in the poll cadence.

use crate::events::outbound::applications;
use crate::store::Store;

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use log::warn;
use once_cell::sync::Lazy;
use tokio::sync::RwLock;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// A poll gap longer than this means the process was suspended.
const WAKE_THRESHOLD: Duration = Duration::from_millis(2500);

/// Monitored application identifier to the UUIDs of plugins watching it.
static MONITORS: Lazy<RwLock<HashMap<String, Vec<String>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

impl crate::store::NotProfile for HashMap<String, String> {}

pub async fn start_monitoring(uuid: &str, identifiers: &[String]) {
    let mut monitors = MONITORS.write().await;
    for identifier in identifiers {
        let watchers = monitors.entry(identifier.clone()).or_default();
        if !watchers.iter().any(|watcher| watcher == uuid) {
            watchers.push(uuid.to_owned());
        }
    }
}

pub async fn stop_monitoring(uuid: &str) {
    let mut monitors = MONITORS.write().await;
    monitors.retain(|_, watchers| {
        watchers.retain(|watcher| watcher != uuid);
        !watchers.is_empty()
    });
}

/// Per-identifier count changes between two polls. Identifiers absent from a
/// map count as zero, so newly monitored applications diff against nothing.
fn count_deltas(
    previous: &HashMap<String, usize>,
    current: &HashMap<String, usize>,
) -> Vec<(String, i64)> {
    let mut deltas = Vec::new();
    for identifier in previous.keys().chain(current.keys()) {
        if deltas.iter().any(|(existing, _)| existing == identifier) {
            continue;
        }
        let before = previous.get(identifier).copied().unwrap_or(0) as i64;
        let after = current.get(identifier).copied().unwrap_or(0) as i64;
        if before != after {
            deltas.push((identifier.clone(), after - before));
        }
    }
    deltas
}

/// The application bundle root of a macOS executable path, if it has one.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn bundle_root(exe: &str) -> Option<&str> {
    exe.split_once("/Contents/MacOS").map(|(root, _)| root)
}

/// Translate a process into the identifier plugins monitor by.
///
/// On macOS this is the bundle identifier, resolved once per bundle and cached
/// on disk; elsewhere it is the executable name.
#[cfg(target_os = "macos")]
fn identify_process(
    name: &str,
    exe: Option<&std::path::Path>,
    cache: &mut Store<HashMap<String, String>>,
) -> Option<String> {
    let _ = name;
    let exe = exe?.to_str()?;
    let root = bundle_root(exe)?;
    if let Some(known) = cache.value.get(root) {
        return Some(known.clone());
    }
    let resolved = std::process::Command::new("defaults")
        .arg("read")
        .arg(format!("{root}/Contents/Info.plist"))
        .arg("CFBundleIdentifier")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No bundle ID".to_owned());
    cache.value.insert(root.to_owned(), resolved.clone());
    if let Err(error) = cache.save() {
        warn!("Failed to save application identifier cache: {}", error);
    }
    Some(resolved)
}

#[cfg(not(target_os = "macos"))]
fn identify_process(
    name: &str,
    _exe: Option<&std::path::Path>,
    _cache: &mut Store<HashMap<String, String>>,
) -> Option<String> {
    Some(name.to_owned())
}

/// Start the background poll loop.
pub fn init_application_watcher() {
    tokio::spawn(async {
        let mut cache = match Store::new(
            "applications",
            &crate::shared::config_dir(),
            HashMap::new(),
        ) {
            Ok(cache) => cache,
            Err(error) => {
                warn!("Failed to open application identifier cache: {}", error);
                return;
            }
        };

        let mut system = sysinfo::System::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut last_poll = SystemTime::now();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let now = SystemTime::now();
            if let Ok(elapsed) = now.duration_since(last_poll)
                && elapsed > WAKE_THRESHOLD
            {
                let _ = applications::system_did_wake_up().await;
            }
            last_poll = now;

            let monitors = MONITORS.read().await;
            if monitors.is_empty() {
                counts.clear();
                continue;
            }

            system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
            let mut current: HashMap<String, usize> =
                monitors.keys().map(|id| (id.clone(), 0)).collect();
            for process in system.processes().values() {
                let name = process.name().to_string_lossy();
                let Some(identifier) = identify_process(&name, process.exe(), &mut cache) else {
                    continue;
                };
                if let Some(count) = current.get_mut(&identifier) {
                    *count += 1;
                }
            }

            for (identifier, delta) in count_deltas(&counts, &current) {
                let Some(watchers) = monitors.get(&identifier) else {
                    continue;
                };
                for plugin in watchers {
                    // One event per started or stopped process.
                    for _ in 0..delta.unsigned_abs() {
                        let result = if delta > 0 {
                            applications::application_did_launch(plugin, identifier.clone()).await
                        } else {
                            applications::application_did_terminate(plugin, identifier.clone())
                                .await
                        };
                        if let Err(error) = result {
                            warn!(
                                "Failed to notify plugin {} about application {}: {}",
                                plugin, identifier, error
                            );
                        }
                    }
                }
            }
            counts = current;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs
            .iter()
            .map(|(id, count)| (id.to_string(), *count))
            .collect()
    }

    #[test]
    fn one_delta_per_process() {
        let deltas = count_deltas(&counts(&[("firefox", 1)]), &counts(&[("firefox", 3)]));
        assert_eq!(deltas, vec![("firefox".to_owned(), 2)]);
    }

    #[test]
    fn terminations_are_negative() {
        let deltas = count_deltas(&counts(&[("obs", 2)]), &counts(&[("obs", 0)]));
        assert_eq!(deltas, vec![("obs".to_owned(), -2)]);
    }

    #[test]
    fn unchanged_counts_emit_nothing() {
        assert!(count_deltas(&counts(&[("obs", 1)]), &counts(&[("obs", 1)])).is_empty());
    }

    #[test]
    fn newly_monitored_identifiers_diff_against_zero() {
        let deltas = count_deltas(&HashMap::new(), &counts(&[("spotify", 1)]));
        assert_eq!(deltas, vec![("spotify".to_owned(), 1)]);
    }

    #[test]
    fn bundle_root_extracts_prefix() {
        assert_eq!(
            bundle_root("/Applications/OBS.app/Contents/MacOS/OBS"),
            Some("/Applications/OBS.app")
        );
        assert_eq!(bundle_root("/usr/bin/true"), None);
    }
}

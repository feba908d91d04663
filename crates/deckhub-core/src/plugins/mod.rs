pub mod info_param;
pub mod manifest;

use crate::shared::{CATEGORIES, Category, config_dir, convert_icon, log_dir};
use crate::store::get_settings;
use crate::ui::{self, UiEvent};
use crate::webview;

use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::{fs, path};

use anyhow::anyhow;
use futures::StreamExt;
use log::{error, warn};
use once_cell::sync::Lazy;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

fn is_safe_relative_path(p: &str) -> bool {
    let p = std::path::Path::new(p);
    !p.is_absolute()
        && !p.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir
                    | std::path::Component::RootDir
                    | std::path::Component::Prefix(_)
            )
        })
}

enum PluginInstance {
    Webview { label: String },
    Wine(Child),
    Native(Child),
}

/// Two-character device ID prefixes claimed by plugins that drive their own
/// hardware, mapped to the owning plugin's UUID.
pub static DEVICE_NAMESPACES: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static INSTANCES: Lazy<Mutex<HashMap<String, PluginInstance>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static SERVERS_STARTED: AtomicBool = AtomicBool::new(false);

/// Initialise a plugin from a given directory.
pub async fn initialise_plugin(path: &path::Path) -> anyhow::Result<()> {
    let plugin_uuid = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid plugin directory name"))?;

    let mut manifest = manifest::read_manifest(path)?;

    if let Some(icon) = manifest.category_icon {
        let category_icon_path = path.join(icon);
        manifest.category_icon = Some(convert_icon(
            category_icon_path.to_string_lossy().to_string(),
        ));
    }

    for action in &mut manifest.actions {
        plugin_uuid.clone_into(&mut action.plugin);

        let action_icon_path = path.join(&action.icon);
        action.icon = convert_icon(action_icon_path.to_string_lossy().to_string());

        if !action.property_inspector.is_empty() {
            if is_safe_relative_path(&action.property_inspector) {
                action.property_inspector = path
                    .join(&action.property_inspector)
                    .to_string_lossy()
                    .to_string();
            } else {
                warn!(
                    "Plugin {} has unsafe PropertyInspectorPath {}; ignoring",
                    plugin_uuid, action.property_inspector
                );
                action.property_inspector.clear();
            }
        } else if let Some(ref property_inspector) = manifest.property_inspector_path
            && is_safe_relative_path(property_inspector)
        {
            action.property_inspector = path.join(property_inspector).to_string_lossy().to_string();
        }

        for state in &mut action.states {
            if state.image == "actionDefaultImage" {
                state.image.clone_from(&action.icon);
            } else {
                let state_icon = path.join(&state.image);
                state.image = convert_icon(state_icon.to_string_lossy().to_string());
            }
        }
    }

    {
        let mut categories = CATEGORIES.write().await;
        if let Some(category) = categories.get_mut(&manifest.category) {
            for action in manifest.actions {
                if let Some(index) = category.actions.iter().position(|v| v.uuid == action.uuid) {
                    category.actions.remove(index);
                }
                category.actions.push(action);
            }
        } else {
            let category = Category {
                icon: manifest.category_icon,
                actions: manifest.actions,
            };
            if !category.actions.is_empty() {
                categories.insert(manifest.category, category);
            }
        }
    }

    if let Some(namespace) = manifest.device_namespace {
        DEVICE_NAMESPACES
            .write()
            .await
            .insert(namespace, plugin_uuid.to_owned());
    }

    #[cfg(target_os = "windows")]
    let platform = "windows";
    #[cfg(target_os = "macos")]
    let platform = "mac";
    #[cfg(target_os = "linux")]
    let platform = "linux";

    let mut code_path = manifest.code_path;
    let mut use_wine = false;
    let mut supported = false;

    // Determine the method used to run the plugin based on its supported
    // operating systems and the current operating system.
    for os in manifest.os {
        if os.platform == platform {
            #[cfg(target_os = "windows")]
            if manifest.code_path_windows.is_some() {
                code_path = manifest.code_path_windows.clone();
            }
            #[cfg(target_os = "macos")]
            if manifest.code_path_macos.is_some() {
                code_path = manifest.code_path_macos;
            }
            #[cfg(target_os = "linux")]
            if manifest.code_path_linux.is_some() {
                code_path = manifest.code_path_linux;
            }

            use_wine = false;
            supported = true;
            break;
        } else if os.platform == "windows" {
            use_wine = true;
            supported = true;
        }
    }

    if code_path.is_none() && use_wine {
        code_path = manifest.code_path_windows;
    }

    if !supported || code_path.is_none() {
        return Err(anyhow!("unsupported on platform {}", platform));
    }

    let code_path = code_path.unwrap();
    if !is_safe_relative_path(&code_path) {
        return Err(anyhow!("unsafe plugin CodePath"));
    }

    let settings = get_settings()?;
    let port_string = settings.value.plugin_port.to_string();
    let args = [
        "-port",
        port_string.as_str(),
        "-pluginUUID",
        plugin_uuid,
        "-registerEvent",
        "register",
        "-info",
    ];

    if code_path.to_lowercase().ends_with(".html")
        || code_path.to_lowercase().ends_with(".htm")
        || code_path.to_lowercase().ends_with(".xhtml")
    {
        let url = format!("file://{}", path.join(&code_path).to_string_lossy());
        let label = plugin_uuid.replace('.', "_");

        let Some(host) = webview::webview_host() else {
            return Err(anyhow!(
                "HTML plugin {plugin_uuid} requires a WebviewHost, but none is configured"
            ));
        };

        let info = info_param::make_info(plugin_uuid.to_owned(), manifest.version, false).await;
        let init_js = format!(
            r#"const deckhubInit = () => {{
				try {{
					connectElgatoStreamDeckSocket({port}, "{uuid}", "{event}", `{info}`);
				}} catch (e) {{
					setTimeout(deckhubInit, 10);
				}}
			}};
			deckhubInit();
			"#,
            port = settings.value.plugin_port,
            uuid = plugin_uuid,
            event = "register",
            info = serde_json::to_string(&info)?
        );

        host.spawn_plugin_webview(&label, &url, &init_js)?;

        if settings.value.developer {
            let _ = host.show_webview(&label);
        }

        INSTANCES
            .lock()
            .await
            .insert(plugin_uuid.to_owned(), PluginInstance::Webview { label });
    } else if use_wine {
        let probe = Command::new("wine")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .and_then(|mut child| child.wait())
            .map(|status| status.success());
        if !matches!(probe, Ok(true)) {
            return Err(anyhow!("failed to detect an installation of Wine"));
        }

        let info = info_param::make_info(plugin_uuid.to_owned(), manifest.version, true).await;
        let log_file =
            fs::File::create(log_dir().join("plugins").join(format!("{plugin_uuid}.log")))?;

        let mut command = Command::new("wine");
        command
            .current_dir(path)
            .arg(code_path)
            .args(args)
            .arg(serde_json::to_string(&info)?)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file));
        if settings.value.separatewine {
            command.env(
                "WINEPREFIX",
                path.join("wineprefix").to_string_lossy().to_string(),
            );
        } else {
            let _ = fs::remove_dir_all(path.join("wineprefix"));
        }
        let child = command.spawn()?;

        INSTANCES
            .lock()
            .await
            .insert(plugin_uuid.to_owned(), PluginInstance::Wine(child));
    } else {
        let info = info_param::make_info(plugin_uuid.to_owned(), manifest.version, false).await;
        let log_file =
            fs::File::create(log_dir().join("plugins").join(format!("{plugin_uuid}.log")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path.join(&code_path), fs::Permissions::from_mode(0o755))?;
        }

        let child = Command::new(path.join(code_path))
            .current_dir(path)
            .args(args)
            .arg(serde_json::to_string(&info)?)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file))
            .spawn()?;

        INSTANCES
            .lock()
            .await
            .insert(plugin_uuid.to_owned(), PluginInstance::Native(child));
    }

    if let Some(applications) = manifest.applications_to_monitor
        && let Some(applications) = applications.get(platform)
    {
        crate::application_watcher::start_monitoring(plugin_uuid, applications).await;
    }

    Ok(())
}

pub async fn deactivate_plugin(uuid: &str) -> Result<(), anyhow::Error> {
    {
        let mut namespaces = DEVICE_NAMESPACES.write().await;
        if let Some((namespace, _)) = namespaces
            .clone()
            .iter()
            .find(|(_, plugin)| uuid == **plugin)
        {
            namespaces.remove(namespace);
            drop(namespaces);
            let devices = crate::shared::DEVICES
                .iter()
                .map(|v| v.key().to_owned())
                .filter(|id| id.get(..2) == Some(namespace.as_str()))
                .collect::<Vec<_>>();
            for device in devices {
                crate::events::inbound::devices::deregister_device(
                    "",
                    crate::events::inbound::PayloadEvent { payload: device },
                )
                .await?;
            }
            ui::emit(UiEvent::DevicesUpdated);
        }
    }

    crate::application_watcher::stop_monitoring(uuid).await;

    if let Some(instance) = INSTANCES.lock().await.remove(uuid) {
        match instance {
            PluginInstance::Webview { label } => {
                if let Some(host) = webview::webview_host() {
                    let _ = host.close_webview(&label);
                }
            }
            PluginInstance::Wine(mut child) | PluginInstance::Native(mut child) => {
                child.kill()?;
                child.wait()?;
            }
        }
        Ok(())
    } else {
        Err(anyhow!("instance of plugin {} not found", uuid))
    }
}

/// Deactivate every running plugin. Used at shutdown.
pub async fn deactivate_all_plugins() {
    let uuids = {
        let instances = INSTANCES.lock().await;
        instances.keys().cloned().collect::<Vec<_>>()
    };

    for uuid in uuids {
        if let Err(error) = deactivate_plugin(&uuid).await {
            warn!("Failed to deactivate plugin {}: {}", uuid, error);
        }
    }
}

/// Initialise plugins from the plugins directory.
pub fn initialise_plugins() {
    // Servers should be started only once; reloading plugins should not rebind ports.
    if !SERVERS_STARTED.swap(true, Ordering::SeqCst) {
        let settings = match get_settings() {
            Ok(store) => store.value,
            Err(error) => {
                error!("Failed to read settings: {}", error);
                std::process::exit(1);
            }
        };
        tokio::spawn(init_websocket_server(settings.plugin_port, "plugin"));
        tokio::spawn(init_websocket_server(
            settings.property_inspector_port,
            "property inspector",
        ));
    } else {
        log::debug!("Plugin servers already running; skipping server init");
    }

    let plugin_dir = config_dir().join("plugins");
    let _ = fs::create_dir_all(&plugin_dir);
    let _ = fs::create_dir_all(log_dir().join("plugins"));

    let disabled = get_settings()
        .map(|store| store.value.disabled_plugins)
        .unwrap_or_default();

    let entries = match fs::read_dir(&plugin_dir) {
        Ok(entries) => entries,
        Err(error) => {
            error!(
                "Failed to read plugins directory at {}: {}",
                plugin_dir.display(),
                error
            );
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!("Failed to read entry of plugins directory: {}", error);
                continue;
            }
        };
        if disabled
            .iter()
            .any(|id| entry.file_name().to_string_lossy() == *id)
        {
            log::info!("Skipping disabled plugin {:?}", entry.file_name());
            continue;
        }
        let entry_path = entry.path();
        let meta = match fs::symlink_metadata(&entry_path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let path = if meta.file_type().is_symlink() {
            // Only follow symlinks that stay within the plugins directory.
            let target = match fs::read_link(&entry_path) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let plugins_canon = match fs::canonicalize(&plugin_dir) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let target_canon = match fs::canonicalize(&target) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !target_canon.starts_with(&plugins_canon) {
                warn!(
                    "Ignoring plugin symlink {} -> {} (escapes plugins dir)",
                    entry_path.display(),
                    target.display()
                );
                continue;
            }
            target
        } else {
            entry_path
        };
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.is_dir() {
            tokio::spawn(async move {
                if let Err(error) = initialise_plugin(&path).await {
                    warn!(
                        "Failed to initialise plugin at {}: {:#}",
                        path.display(),
                        error
                    );
                }
            });
        }
    }
}

/// Start a WebSocket listener that plugins or property inspectors connect to.
///
/// A bind failure here leaves the broker unable to do its job, so it is fatal.
async fn init_websocket_server(port: u16, role: &'static str) {
    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(
                "Failed to bind {} WebSocket server to port {}: {}",
                role, port, error
            );
            std::process::exit(1);
        }
    };

    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(accept_connection(stream));
    }
}

/// Handle an incoming WebSocket connection.
async fn accept_connection(stream: TcpStream) {
    // `setImage` payloads can carry a data URI, so the frame cap must be generous.
    const MAX_WS_MESSAGE_BYTES: usize = 10 * 1024 * 1024;
    let mut cfg = WebSocketConfig::default();
    cfg.max_message_size = Some(MAX_WS_MESSAGE_BYTES);
    cfg.max_frame_size = Some(MAX_WS_MESSAGE_BYTES);
    cfg.accept_unmasked_frames = false;

    let mut socket = match tokio_tungstenite::accept_async_with_config(stream, Some(cfg)).await {
        Ok(socket) => socket,
        Err(error) => {
            warn!("Failed to complete WebSocket handshake: {}", error);
            return;
        }
    };

    // First message should be a registration event. Never `unwrap()` here: a
    // client can disconnect immediately, and a panic would take down the whole
    // server task.
    let Some(first) = socket.next().await else {
        return;
    };
    let first = match first {
        Ok(message) => message,
        Err(error) => {
            warn!("WebSocket error before registration: {}", error);
            return;
        }
    };
    let Ok(text) = first.into_text() else {
        return;
    };

    match serde_json::from_str::<crate::events::inbound::RegisterEvent>(&text) {
        Ok(event) => crate::events::register_plugin(event, socket).await,
        Err(_) => {
            crate::events::inbound::process_incoming_message(
                Ok(tokio_tungstenite::tungstenite::Message::Text(text)),
                "",
            )
            .await;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::is_safe_relative_path;

    #[test]
    fn safe_relative_path_rejects_traversal_and_absolute() {
        assert!(is_safe_relative_path("foo/bar"));
        assert!(is_safe_relative_path("assets/propertyInspector/index.html"));

        assert!(!is_safe_relative_path("../evil"));
        assert!(!is_safe_relative_path("foo/../../evil"));
        assert!(!is_safe_relative_path("/etc/passwd"));
    }
}

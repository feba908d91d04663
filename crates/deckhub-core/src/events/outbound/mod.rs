pub mod applications;
pub mod devices;
pub mod encoder;
pub mod keypad;
pub mod property_inspector;
pub mod settings;
pub mod states;
pub mod will_appear;

use futures::SinkExt;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

#[derive(Serialize)]
struct Coordinates {
    row: u8,
    column: u8,
}

impl Coordinates {
    fn of(context: &crate::shared::ActionContext) -> Self {
        match &context.controller[..] {
            "Encoder" => Coordinates {
                row: 0,
                column: context.position,
            },
            _ => {
                let columns = crate::shared::DEVICES
                    .get(&context.device)
                    .map(|d| d.columns)
                    .unwrap_or(1)
                    .max(1);
                Coordinates {
                    row: context.position / columns,
                    column: context.position % columns,
                }
            }
        }
    }
}

#[derive(Serialize)]
#[allow(non_snake_case)]
struct GenericInstancePayload {
    settings: serde_json::Value,
    coordinates: Coordinates,
    controller: String,
    state: u16,
    isInMultiAction: bool,
}

impl GenericInstancePayload {
    fn new(instance: &crate::shared::ActionInstance) -> Self {
        Self {
            settings: instance.settings.clone(),
            coordinates: Coordinates::of(&instance.context),
            controller: instance.context.controller.clone(),
            state: instance.current_state,
            isInMultiAction: false,
        }
    }
}

pub(super) async fn send_to_plugin(
    plugin: &str,
    data: &impl Serialize,
) -> Result<(), anyhow::Error> {
    let message = Message::Text(serde_json::to_string(data)?.into());
    // One lock covers the socket lookup and the queue append.
    let mut channels = super::PLUGIN_CHANNELS.lock().await;

    if let Some(socket) = channels.sockets.get_mut(plugin) {
        socket.send(message).await?;
    } else {
        channels.enqueue(plugin, message);
    }

    Ok(())
}

async fn send_to_all_plugins(data: &impl Serialize) -> Result<(), anyhow::Error> {
    let plugins_dir = crate::shared::config_dir().join("plugins");
    let plugins_canon = tokio::fs::canonicalize(&plugins_dir)
        .await
        .unwrap_or(plugins_dir.clone());
    let mut entries = tokio::fs::read_dir(&plugins_dir).await?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let entry_path = entry.path();
        let meta = tokio::fs::symlink_metadata(&entry_path).await?;
        let path = if meta.file_type().is_symlink() {
            let target = tokio::fs::read_link(&entry_path).await?;
            let target_canon = tokio::fs::canonicalize(&target)
                .await
                .unwrap_or(target.clone());
            if !target_canon.starts_with(&plugins_canon) {
                continue;
            }
            target
        } else {
            entry_path
        };
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            let _ = send_to_plugin(name, data).await;
        }
    }
    Ok(())
}

async fn send_to_property_inspector(
    context: &crate::shared::ActionContext,
    data: &impl Serialize,
) -> Result<(), anyhow::Error> {
    let message = Message::Text(serde_json::to_string(data)?.into());
    let mut channels = super::PROPERTY_INSPECTOR_CHANNELS.lock().await;

    if let Some(socket) = channels.sockets.get_mut(&context.to_string()) {
        socket.send(message).await?;
    } else {
        channels.enqueue(&context.to_string(), message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{ActionContext, DEVICES, DeviceInfo};

    #[test]
    fn keypad_coordinates_derive_from_device_geometry() {
        DEVICES.insert(
            "test-geom".to_owned(),
            DeviceInfo {
                id: "test-geom".to_owned(),
                name: "Test".to_owned(),
                rows: 3,
                columns: 5,
                encoders: 2,
                r#type: 0,
            },
        );
        let context = ActionContext {
            device: "test-geom".to_owned(),
            profile: "Default".to_owned(),
            controller: "Keypad".to_owned(),
            position: 7,
            index: 0,
        };
        let coords = Coordinates::of(&context);
        assert_eq!((coords.row, coords.column), (1, 2));
        DEVICES.remove("test-geom");
    }

    #[test]
    fn encoder_coordinates_are_row_zero() {
        let context = ActionContext {
            device: "missing".to_owned(),
            profile: "Default".to_owned(),
            controller: "Encoder".to_owned(),
            position: 3,
            index: 0,
        };
        let coords = Coordinates::of(&context);
        assert_eq!((coords.row, coords.column), (0, 3));
    }
}

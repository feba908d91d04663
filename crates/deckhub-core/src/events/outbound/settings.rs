use super::{Coordinates, send_to_plugin, send_to_property_inspector};

use crate::shared::ActionInstance;

use serde::Serialize;

#[derive(Serialize)]
struct DidReceiveSettingsPayload {
    settings: serde_json::Value,
    coordinates: Coordinates,
}

#[derive(Serialize)]
struct DidReceiveSettings {
    event: &'static str,
    action: String,
    context: crate::shared::ActionContext,
    device: String,
    payload: DidReceiveSettingsPayload,
}

#[derive(Serialize)]
struct DidReceiveGlobalSettingsPayload {
    settings: serde_json::Value,
}

#[derive(Serialize)]
struct DidReceiveGlobalSettings {
    event: &'static str,
    payload: DidReceiveGlobalSettingsPayload,
}

pub async fn did_receive_settings(
    instance: &ActionInstance,
    to_property_inspector: bool,
) -> Result<(), anyhow::Error> {
    let data = DidReceiveSettings {
        event: "didReceiveSettings",
        action: instance.action.uuid.clone(),
        context: instance.context.clone(),
        device: instance.context.device.clone(),
        payload: DidReceiveSettingsPayload {
            settings: instance.settings.clone(),
            coordinates: Coordinates::of(&instance.context),
        },
    };
    if to_property_inspector {
        send_to_property_inspector(&instance.context, &data).await
    } else {
        send_to_plugin(&instance.action.plugin, &data).await
    }
}

/// Send a plugin's global settings to it and to all of its property inspectors.
pub async fn did_receive_global_settings(plugin: &str) -> Result<(), anyhow::Error> {
    let path = crate::shared::config_dir()
        .join("settings")
        .join(format!("{}.json", plugin));
    let settings: serde_json::Value = match std::fs::read(path) {
        Ok(contents) => serde_json::from_slice(&contents)?,
        Err(_) => serde_json::Value::Object(serde_json::Map::new()),
    };

    let data = DidReceiveGlobalSettings {
        event: "didReceiveGlobalSettings",
        payload: DidReceiveGlobalSettingsPayload { settings },
    };
    send_to_plugin(plugin, &data).await?;

    let locks = crate::store::profiles::acquire_locks().await;
    for context in locks.profile_stores.all_from_plugin(plugin) {
        send_to_property_inspector(&context, &data).await?;
    }

    Ok(())
}

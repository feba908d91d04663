use crate::shared::ActionContext;
use crate::store::profiles::{acquire_locks, get_instance};

use serde::Serialize;

#[derive(Serialize)]
struct SendTo {
    event: &'static str,
    action: String,
    context: ActionContext,
    payload: serde_json::Value,
}

pub async fn send_to_property_inspector(
    context: ActionContext,
    message: serde_json::Value,
) -> Result<(), anyhow::Error> {
    let locks = acquire_locks().await;
    if let Some(instance) = get_instance(&context, &locks).await? {
        super::send_to_property_inspector(
            &context,
            &SendTo {
                event: "sendToPropertyInspector",
                action: instance.action.uuid.clone(),
                context: context.clone(),
                payload: message,
            },
        )
        .await?;
    }

    Ok(())
}

pub async fn send_to_plugin(
    context: ActionContext,
    message: serde_json::Value,
) -> Result<(), anyhow::Error> {
    let locks = acquire_locks().await;
    if let Some(instance) = get_instance(&context, &locks).await? {
        super::send_to_plugin(
            &instance.action.plugin,
            &SendTo {
                event: "sendToPlugin",
                action: instance.action.uuid.clone(),
                context,
                payload: message,
            },
        )
        .await?;
    }

    Ok(())
}

#[derive(Serialize)]
struct PropertyInspectorAppearEvent {
    event: &'static str,
    action: String,
    context: ActionContext,
    device: String,
}

pub async fn property_inspector_did_appear(
    context: ActionContext,
    event: &'static str,
) -> Result<(), anyhow::Error> {
    let locks = acquire_locks().await;
    if let Some(instance) = get_instance(&context, &locks).await? {
        super::send_to_plugin(
            &instance.action.plugin,
            &PropertyInspectorAppearEvent {
                event,
                action: instance.action.uuid.clone(),
                device: context.device.clone(),
                context,
            },
        )
        .await?;
    }

    Ok(())
}

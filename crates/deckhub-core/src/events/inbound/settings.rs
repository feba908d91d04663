use crate::events::outbound::settings as outbound;
use crate::shared::ActionContext;
use crate::store::profiles::{
    acquire_locks, acquire_locks_mut, get_instance, get_instance_mut, save_profile,
};

use std::str::FromStr;

pub async fn set_settings(
    event: super::ContextAndPayloadEvent<serde_json::Value>,
    from_property_inspector: bool,
) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;

    if let Some(instance) = get_instance_mut(&event.context, &mut locks).await? {
        instance.settings = event.payload;
        // Mirror the change to the other side of the pair.
        outbound::did_receive_settings(instance, !from_property_inspector).await?;
        save_profile(&event.context.device, &event.context.profile, &mut locks).await?;
    }

    Ok(())
}

pub async fn get_settings(
    event: super::ContextEvent,
    from_property_inspector: bool,
) -> Result<(), anyhow::Error> {
    let locks = acquire_locks().await;

    if let Some(instance) = get_instance(&event.context, &locks).await? {
        outbound::did_receive_settings(instance, from_property_inspector).await?;
    }

    Ok(())
}

async fn plugin_for_context(
    context: &str,
    from_property_inspector: bool,
) -> Result<Option<String>, anyhow::Error> {
    if !from_property_inspector {
        return Ok(Some(context.to_owned()));
    }
    // Property inspectors identify themselves with their instance context.
    let locks = acquire_locks().await;
    Ok(get_instance(&ActionContext::from_str(context)?, &locks)
        .await?
        .map(|instance| instance.action.plugin.clone()))
}

pub async fn set_global_settings(
    event: super::ContextAndPayloadEvent<serde_json::Value, String>,
    from_property_inspector: bool,
) -> Result<(), anyhow::Error> {
    let Some(uuid) = plugin_for_context(&event.context, from_property_inspector).await? else {
        return Ok(());
    };

    {
        let settings_dir = crate::shared::config_dir().join("settings");
        tokio::fs::create_dir_all(&settings_dir).await?;

        let path = settings_dir.join(uuid.clone() + ".json");
        tokio::fs::write(path, event.payload.to_string()).await?;
    }

    outbound::did_receive_global_settings(&uuid).await?;

    Ok(())
}

pub async fn get_global_settings(
    event: super::ContextEvent<String>,
    from_property_inspector: bool,
) -> Result<(), anyhow::Error> {
    let Some(uuid) = plugin_for_context(&event.context, from_property_inspector).await? else {
        return Ok(());
    };

    outbound::did_receive_global_settings(&uuid).await
}

use super::{ContextAndPayloadEvent, ContextEvent, PayloadEvent};

use crate::ui::{self, UiEvent};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct OpenUrlEvent {
    pub url: String,
}

pub async fn open_url(event: PayloadEvent<OpenUrlEvent>) -> Result<(), anyhow::Error> {
    // Most plugins use this for http(s) links; refuse anything else.
    let url = event.payload.url.trim();
    if url.len() > 2048 {
        return Ok(());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Ok(());
    }
    log::debug!("Opening URL {}", url);
    open::that_detached(url)?;
    Ok(())
}

#[derive(Deserialize)]
pub struct LogMessageEvent {
    pub message: String,
}

pub async fn log_message(
    uuid: Option<&str>,
    mut event: PayloadEvent<LogMessageEvent>,
) -> Result<(), anyhow::Error> {
    if let Some(uuid) = uuid
        && let Ok(manifest) = crate::plugins::manifest::read_manifest(
            &crate::shared::config_dir().join("plugins").join(uuid),
        )
    {
        event.payload.message = format!("[{}] {}", manifest.name, event.payload.message);
    }
    log::info!("{}", event.payload.message.trim());
    Ok(())
}

pub async fn show_alert(event: ContextEvent) -> Result<(), anyhow::Error> {
    ui::emit(UiEvent::ShowAlert {
        context: event.context.into(),
    });
    Ok(())
}

pub async fn show_ok(event: ContextEvent) -> Result<(), anyhow::Error> {
    ui::emit(UiEvent::ShowOk {
        context: event.context.into(),
    });
    Ok(())
}

pub async fn send_to_property_inspector(
    event: ContextAndPayloadEvent<serde_json::Value>,
) -> Result<(), anyhow::Error> {
    crate::events::outbound::property_inspector::send_to_property_inspector(
        event.context,
        event.payload,
    )
    .await
}

pub async fn send_to_plugin(
    event: ContextAndPayloadEvent<serde_json::Value>,
) -> Result<(), anyhow::Error> {
    crate::events::outbound::property_inspector::send_to_plugin(event.context, event.payload).await
}

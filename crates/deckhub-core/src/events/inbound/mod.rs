pub mod devices;
mod misc;
mod settings;
mod states;

use crate::shared::ActionContext;

use log::warn;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "camelCase")]
pub enum RegisterEvent {
    Register { uuid: String },
    RegisterPropertyInspector { uuid: String },
}

#[derive(Deserialize)]
pub struct ContextEvent<C = ActionContext> {
    pub context: C,
}

#[derive(Deserialize)]
pub struct PayloadEvent<T> {
    pub payload: T,
}

#[derive(Deserialize)]
pub struct ContextAndPayloadEvent<T, C = ActionContext> {
    pub context: C,
    pub payload: T,
}

#[derive(Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "camelCase")]
pub enum InboundEventType {
    SetSettings(ContextAndPayloadEvent<serde_json::Value>),
    GetSettings(ContextEvent),
    SetGlobalSettings(ContextAndPayloadEvent<serde_json::Value, String>),
    GetGlobalSettings(ContextEvent<String>),
    SetTitle(ContextAndPayloadEvent<states::SetTitlePayload>),
    SetImage(ContextAndPayloadEvent<states::SetImagePayload>),
    SetState(ContextAndPayloadEvent<states::SetStatePayload>),
    ShowAlert(ContextEvent),
    ShowOk(ContextEvent),
    OpenUrl(PayloadEvent<misc::OpenUrlEvent>),
    LogMessage(PayloadEvent<misc::LogMessageEvent>),
    SendToPropertyInspector(ContextAndPayloadEvent<serde_json::Value>),
    SendToPlugin(ContextAndPayloadEvent<serde_json::Value>),
    RegisterDevice(PayloadEvent<crate::shared::DeviceInfo>),
    DeregisterDevice(PayloadEvent<String>),
    KeyDown(PayloadEvent<devices::PressPayload>),
    KeyUp(PayloadEvent<devices::PressPayload>),
    EncoderChange(PayloadEvent<devices::TicksPayload>),
    EncoderDown(PayloadEvent<devices::PressPayload>),
    EncoderUp(PayloadEvent<devices::PressPayload>),
}

pub async fn process_incoming_message(
    data: Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>,
    uuid: &str,
) {
    let Ok(tokio_tungstenite::tungstenite::Message::Text(text)) = data else {
        return;
    };
    // Unrecognised events are silently ignored.
    let decoded: InboundEventType = match serde_json::from_str(&text) {
        Ok(event) => event,
        Err(_) => return,
    };

    if let Err(error) = match decoded {
        InboundEventType::SetSettings(event) => settings::set_settings(event, false).await,
        InboundEventType::GetSettings(event) => settings::get_settings(event, false).await,
        InboundEventType::SetGlobalSettings(event) => {
            settings::set_global_settings(event, false).await
        }
        InboundEventType::GetGlobalSettings(event) => {
            settings::get_global_settings(event, false).await
        }
        InboundEventType::SetTitle(event) => states::set_title(event).await,
        InboundEventType::SetImage(event) => states::set_image(event).await,
        InboundEventType::SetState(event) => states::set_state(event).await,
        InboundEventType::ShowAlert(event) => misc::show_alert(event).await,
        InboundEventType::ShowOk(event) => misc::show_ok(event).await,
        InboundEventType::OpenUrl(event) => misc::open_url(event).await,
        InboundEventType::LogMessage(event) => misc::log_message(Some(uuid), event).await,
        InboundEventType::SendToPropertyInspector(event) => {
            misc::send_to_property_inspector(event).await
        }
        InboundEventType::RegisterDevice(event) => devices::register_device(uuid, event).await,
        InboundEventType::DeregisterDevice(event) => devices::deregister_device(uuid, event).await,
        InboundEventType::KeyDown(event) => devices::key_down(event).await,
        InboundEventType::KeyUp(event) => devices::key_up(event).await,
        InboundEventType::EncoderChange(event) => devices::encoder_change(event).await,
        InboundEventType::EncoderDown(event) => devices::encoder_down(event).await,
        InboundEventType::EncoderUp(event) => devices::encoder_up(event).await,
        InboundEventType::SendToPlugin(_) => Ok(()),
    } {
        warn!(
            "Failed to process incoming event from plugin: {}\n\tCaused by: {}",
            error,
            error.root_cause()
        );
    }
}

pub async fn process_incoming_message_pi(
    data: Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>,
    _uuid: &str,
) {
    let Ok(tokio_tungstenite::tungstenite::Message::Text(text)) = data else {
        return;
    };
    let decoded: InboundEventType = match serde_json::from_str(&text) {
        Ok(event) => event,
        Err(_) => return,
    };

    if let Err(error) = match decoded {
        InboundEventType::SetSettings(event) => settings::set_settings(event, true).await,
        InboundEventType::GetSettings(event) => settings::get_settings(event, true).await,
        InboundEventType::SetGlobalSettings(event) => {
            settings::set_global_settings(event, true).await
        }
        InboundEventType::GetGlobalSettings(event) => {
            settings::get_global_settings(event, true).await
        }
        InboundEventType::OpenUrl(event) => misc::open_url(event).await,
        InboundEventType::LogMessage(event) => misc::log_message(None, event).await,
        InboundEventType::SendToPlugin(event) => misc::send_to_plugin(event).await,
        _ => Ok(()),
    } {
        warn!(
            "Failed to process incoming event from property inspector: {}\n\tCaused by: {}",
            error,
            error.root_cause()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_events_parse() {
        let plugin: RegisterEvent =
            serde_json::from_str(r#"{"event":"register","uuid":"com.example.plugin"}"#).unwrap();
        assert!(matches!(plugin, RegisterEvent::Register { uuid } if uuid == "com.example.plugin"));

        let pi: RegisterEvent = serde_json::from_str(
            r#"{"event":"registerPropertyInspector","uuid":"dev.Default.Keypad.0.0"}"#,
        )
        .unwrap();
        assert!(
            matches!(pi, RegisterEvent::RegisterPropertyInspector { uuid } if uuid == "dev.Default.Keypad.0.0")
        );
    }

    #[test]
    fn unknown_events_fail_to_parse() {
        assert!(serde_json::from_str::<InboundEventType>(r#"{"event":"noSuchEvent"}"#).is_err());
    }

    #[test]
    fn set_title_event_parses() {
        let event: InboundEventType = serde_json::from_str(
            r#"{"event":"setTitle","context":"dev.Default.Keypad.0.0","payload":{"title":"Hello","state":0}}"#,
        )
        .unwrap();
        assert!(matches!(event, InboundEventType::SetTitle(_)));
    }
}

use super::{Coordinates, send_to_plugin};

use crate::shared::ActionContext;
use crate::store::profiles::{acquire_locks_mut, get_instance_mut};
use crate::ui::{self, UiEvent};

use serde::Serialize;

#[derive(Serialize)]
struct DialRotatePayload {
    settings: serde_json::Value,
    coordinates: Coordinates,
    ticks: i16,
    pressed: bool,
}

#[derive(Serialize)]
struct DialRotateEvent {
    event: &'static str,
    action: String,
    context: ActionContext,
    device: String,
    payload: DialRotatePayload,
}

pub async fn dial_rotate(device: &str, index: u8, ticks: i16) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let selected_profile = locks.device_stores.get_selected_profile(device)?;
    let context = ActionContext {
        device: device.to_owned(),
        profile: selected_profile,
        controller: "Encoder".to_owned(),
        position: index,
        index: 0,
    };
    let Some(instance) = get_instance_mut(&context, &mut locks).await? else {
        return Ok(());
    };

    send_to_plugin(
        &instance.action.plugin,
        &DialRotateEvent {
            event: "dialRotate",
            action: instance.action.uuid.clone(),
            context: instance.context.clone(),
            device: instance.context.device.clone(),
            payload: DialRotatePayload {
                settings: instance.settings.clone(),
                coordinates: Coordinates::of(&instance.context),
                ticks,
                pressed: false,
            },
        },
    )
    .await
}

#[derive(Serialize)]
struct DialPressPayload {
    controller: &'static str,
    settings: serde_json::Value,
    coordinates: Coordinates,
}

#[derive(Serialize)]
struct DialPressEvent {
    event: &'static str,
    action: String,
    context: ActionContext,
    device: String,
    payload: DialPressPayload,
}

pub async fn dial_press(device: &str, event: &'static str, index: u8) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let selected_profile = locks.device_stores.get_selected_profile(device)?;
    let context = ActionContext {
        device: device.to_owned(),
        profile: selected_profile,
        controller: "Encoder".to_owned(),
        position: index,
        index: 0,
    };
    let Some(instance) = get_instance_mut(&context, &mut locks).await? else {
        return Ok(());
    };
    ui::emit(UiEvent::KeyMoved {
        context: context.clone().into(),
        down: event == "dialDown",
    });

    send_to_plugin(
        &instance.action.plugin,
        &DialPressEvent {
            event,
            action: instance.action.uuid.clone(),
            context: instance.context.clone(),
            device: instance.context.device.clone(),
            payload: DialPressPayload {
                controller: "Encoder",
                settings: instance.settings.clone(),
                coordinates: Coordinates::of(&instance.context),
            },
        },
    )
    .await
}

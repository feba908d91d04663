use super::{send_to_all_plugins, send_to_plugin};

use crate::plugins::{DEVICE_NAMESPACES, info_param::DeviceInfo};
use crate::shared::ActionInstance;

use serde::Serialize;

#[derive(Serialize)]
#[allow(non_snake_case)]
struct DeviceDidConnectEvent {
    event: &'static str,
    device: String,
    deviceInfo: DeviceInfo,
}

pub async fn device_did_connect(id: &str, info: DeviceInfo) -> Result<(), anyhow::Error> {
    send_to_all_plugins(&DeviceDidConnectEvent {
        event: "deviceDidConnect",
        device: id.to_owned(),
        deviceInfo: info,
    })
    .await
}

#[derive(Serialize)]
struct DeviceDidDisconnectEvent {
    event: &'static str,
    device: String,
}

pub async fn device_did_disconnect(id: &str) -> Result<(), anyhow::Error> {
    send_to_all_plugins(&DeviceDidDisconnectEvent {
        event: "deviceDidDisconnect",
        device: id.to_owned(),
    })
    .await
}

#[derive(Serialize)]
struct SetImageEvent {
    event: &'static str,
    device: String,
    controller: Option<String>,
    position: Option<u8>,
    image: Option<String>,
}

/// Push an image to the hardware slot a context refers to.
pub async fn update_image(
    context: crate::shared::Context,
    image: Option<String>,
) -> Result<(), anyhow::Error> {
    let namespaces = DEVICE_NAMESPACES.read().await;
    if let Some(plugin) = context.device.get(..2).and_then(|prefix| namespaces.get(prefix)) {
        send_to_plugin(
            plugin,
            &SetImageEvent {
                event: "setImage",
                device: context.device.clone(),
                controller: Some(context.controller),
                position: Some(context.position),
                image,
            },
        )
        .await?;
    } else if context.device.starts_with("sd-") {
        crate::devices::elgato::update_image(&context, image.as_deref()).await?;
    } else if context.device.starts_with("vd-") {
        crate::devices::virtual_device::update_image(&context, image.as_deref()).await?;
    }

    Ok(())
}

/// The image the device should show for an instance before its plugin draws anything.
pub fn effective_image_for_instance(instance: &ActionInstance) -> Option<String> {
    let state = instance.states.get(instance.current_state as usize)?;
    let image = state.image.trim();
    if image.is_empty() || image == "actionDefaultImage" {
        let icon = instance.action.icon.trim();
        if icon.is_empty() {
            return None;
        }
        return Some(crate::shared::convert_icon(icon.to_owned()));
    }
    Some(image.to_owned())
}

pub async fn update_image_for_instance(
    instance: &ActionInstance,
    image: Option<String>,
) -> Result<(), anyhow::Error> {
    update_image((&instance.context).into(), image).await
}

pub async fn clear_screen(device: String) -> Result<(), anyhow::Error> {
    let namespaces = DEVICE_NAMESPACES.read().await;
    if let Some(plugin) = device.get(..2).and_then(|prefix| namespaces.get(prefix)) {
        send_to_plugin(
            plugin,
            &SetImageEvent {
                event: "setImage",
                device: device.clone(),
                controller: None,
                position: None,
                image: None,
            },
        )
        .await?;
    } else if device.starts_with("sd-") {
        crate::devices::elgato::clear_screen(&device).await?;
    }

    Ok(())
}

#[derive(Serialize)]
struct SetBrightnessEvent {
    event: &'static str,
    device: String,
    brightness: u8,
}

pub async fn set_brightness(brightness: u8) -> Result<(), anyhow::Error> {
    let namespaces = DEVICE_NAMESPACES.read().await;
    for device in crate::shared::DEVICES.iter() {
        if let Some(plugin) = device.id.get(..2).and_then(|prefix| namespaces.get(prefix)) {
            send_to_plugin(
                plugin,
                &SetBrightnessEvent {
                    event: "setBrightness",
                    device: device.id.clone(),
                    brightness,
                },
            )
            .await?;
        }
    }
    crate::devices::elgato::set_brightness(brightness).await;

    Ok(())
}

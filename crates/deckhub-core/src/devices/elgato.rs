//! Native HID key grids driven through the `elgato-streamdeck` crate.

use crate::events::outbound::{encoder, keypad};

use std::collections::HashMap;
use std::path::Path;

use base64::Engine as _;
use elgato_streamdeck::{AsyncStreamDeck, DeviceStateUpdate, info::Kind};
use once_cell::sync::Lazy;
use tokio::sync::RwLock;

static ELGATO_DEVICES: Lazy<RwLock<HashMap<String, AsyncStreamDeck>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Map between the hardware's native key order and the broker's row-major
/// order. The hardware numbers keys right-to-left within each row, so the
/// conversion reverses each row; it is its own inverse.
pub fn convert_index(columns: u8, index: u8) -> u8 {
    if columns == 0 {
        return index;
    }
    let row = index / columns;
    let column = index % columns;
    row * columns + (columns - 1 - column)
}

async fn load_dynamic_image(image: &str) -> Result<image::DynamicImage, anyhow::Error> {
    if image.trim().starts_with("data:") {
        // Plugins commonly push images as data URLs.
        // Support both base64 and "raw" (non-base64) payloads.
        let bytes = if image.contains(";base64,") {
            let (_meta, b64) = image
                .split_once(";base64,")
                .ok_or_else(|| anyhow::anyhow!("invalid data url (missing ';base64,')"))?;
            base64::engine::general_purpose::STANDARD.decode(b64)?
        } else {
            let (_meta, raw) = image
                .split_once(',')
                .ok_or_else(|| anyhow::anyhow!("invalid data url (missing ',')"))?;
            raw.as_bytes().to_vec()
        };
        Ok(image::load_from_memory(&bytes)?)
    } else {
        let p = Path::new(image.trim());
        if !p.is_file() {
            return Err(anyhow::anyhow!("image path not found: {image}"));
        }
        Ok(image::open(p)?)
    }
}

pub async fn update_image(
    context: &crate::shared::Context,
    image: Option<&str>,
) -> Result<(), anyhow::Error> {
    if let Some(device) = ELGATO_DEVICES.read().await.get(&context.device) {
        // Dials have no per-slot display surface on these devices.
        if context.controller == "Encoder" {
            return Ok(());
        }
        let position = convert_index(device.kind().column_count(), context.position);
        if let Some(image) = image {
            let dyn_img = load_dynamic_image(image).await?;
            device.set_button_image(position, dyn_img).await?;
        } else {
            device.clear_button_image(position).await?;
        }
        device.flush().await?;
    }
    Ok(())
}

pub async fn clear_screen(id: &str) -> Result<(), anyhow::Error> {
    if let Some(device) = ELGATO_DEVICES.read().await.get(id) {
        device.clear_all_button_images().await?;
        device.flush().await?;
    }
    Ok(())
}

pub async fn set_brightness(brightness: u8) {
    for (_id, device) in ELGATO_DEVICES.read().await.iter() {
        let _ = device.set_brightness(brightness.clamp(0, 100)).await;
        let _ = device.flush().await;
    }
}

async fn init(device: AsyncStreamDeck, device_id: String) {
    if ELGATO_DEVICES.read().await.contains_key(&device_id) {
        return;
    }

    let kind = device.kind();
    let device_type = match kind {
        Kind::Original | Kind::OriginalV2 | Kind::Mk2 | Kind::Mk2Scissor | Kind::Mk2Module => 0,
        Kind::Mini | Kind::MiniMk2 | Kind::MiniDiscord | Kind::MiniMk2Module => 1,
        Kind::Xl | Kind::XlV2 | Kind::XlV2Module => 2,
        Kind::Pedal => 5,
        Kind::Plus => 7,
        Kind::Neo => 9,
    };
    let _ = device.clear_all_button_images().await;
    if let Ok(settings) = crate::store::get_settings() {
        let _ = device.set_brightness(settings.value.brightness).await;
    }
    let _ = device.flush().await;

    // IMPORTANT: register the physical device handle before we emit `willAppear`.
    // `register_device()` triggers `will_appear()` for each instance, which pushes initial
    // images to hardware via `elgato::update_image()`. If we haven't inserted the device yet,
    // those initial image writes are silently skipped.
    let name = device.product().await.unwrap_or_else(|_| "Elgato".to_owned());
    let reader = device.get_reader();
    ELGATO_DEVICES
        .write()
        .await
        .insert(device_id.clone(), device);

    let registered = crate::events::inbound::devices::register_device(
        "",
        crate::events::inbound::PayloadEvent {
            payload: crate::shared::DeviceInfo {
                id: device_id.clone(),
                name,
                rows: kind.row_count(),
                columns: kind.column_count(),
                encoders: kind.encoder_count(),
                r#type: device_type,
            },
        },
    )
    .await;
    if let Err(error) = registered {
        log::error!("Failed to register device {}: {}", device_id, error);
        ELGATO_DEVICES.write().await.remove(&device_id);
        return;
    }

    let columns = kind.column_count();
    loop {
        let updates = match reader.read(100.0).await {
            Ok(updates) => updates,
            Err(_) => break,
        };
        for update in updates {
            match match update {
                DeviceStateUpdate::ButtonDown(key) => {
                    keypad::key_down(&device_id, convert_index(columns, key)).await
                }
                DeviceStateUpdate::ButtonUp(key) => {
                    keypad::key_up(&device_id, convert_index(columns, key)).await
                }
                DeviceStateUpdate::EncoderTwist(dial, ticks) => {
                    encoder::dial_rotate(&device_id, dial, ticks.into()).await
                }
                DeviceStateUpdate::EncoderDown(dial) => {
                    encoder::dial_press(&device_id, "dialDown", dial).await
                }
                DeviceStateUpdate::EncoderUp(dial) => {
                    encoder::dial_press(&device_id, "dialUp", dial).await
                }
                _ => Ok(()),
            } {
                Ok(_) => (),
                Err(error) => log::warn!("Failed to process device event {update:?}: {error}"),
            }
        }
    }

    ELGATO_DEVICES.write().await.remove(&device_id);
    if let Err(error) = crate::events::inbound::devices::deregister_device(
        "",
        crate::events::inbound::PayloadEvent { payload: device_id },
    )
    .await
    {
        log::error!("Failed to deregister device: {}", error);
    }
}

/// Attempt to initialise all connected devices.
pub async fn initialise_devices() {
    // Iterate through detected devices and attempt to register them.
    match elgato_streamdeck::new_hidapi() {
        Ok(hid) => {
            for (kind, serial) in elgato_streamdeck::asynchronous::list_devices_async(&hid) {
                let device_id = format!("sd-{serial}");
                if ELGATO_DEVICES.read().await.contains_key(&device_id) {
                    continue;
                }
                match elgato_streamdeck::AsyncStreamDeck::connect(&hid, kind, &serial) {
                    Ok(device) => {
                        tokio::spawn(init(device, device_id));
                    }
                    Err(error) => log::warn!("Failed to connect to device: {error}"),
                }
            }
        }
        Err(error) => log::warn!("Failed to initialise hidapi: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::convert_index;

    #[test]
    fn rows_are_reversed_in_place() {
        let remapped: Vec<u8> = (0..9).map(|i| convert_index(3, i)).collect();
        assert_eq!(remapped, vec![2, 1, 0, 5, 4, 3, 8, 7, 6]);
    }

    #[test]
    fn conversion_is_its_own_inverse() {
        for columns in [3u8, 4, 5, 8] {
            for index in 0..(columns * 4) {
                assert_eq!(convert_index(columns, convert_index(columns, index)), index);
            }
        }
    }

    #[test]
    fn zero_columns_passes_through() {
        assert_eq!(convert_index(0, 4), 4);
    }
}

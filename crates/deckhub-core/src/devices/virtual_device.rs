//! A virtual device for testing without hardware.
//!
//! Each WebSocket connection acts as one device speaking the same raw frame
//! protocol as the serial decks; image pushes are forwarded back verbatim.

use super::prontokey::{RawState, take_frames};

use std::collections::HashMap;

use futures::{SinkExt, StreamExt, stream::SplitSink};
use log::{info, warn};
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

const PORT: u16 = 1925;

static VIRTUAL_SOCKETS: Lazy<Mutex<HashMap<String, SplitSink<WebSocketStream<TcpStream>, Message>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Serialize)]
struct SetImageFrame<'a> {
    event: &'static str,
    controller: &'a str,
    position: u8,
    image: Option<&'a str>,
}

pub async fn update_image(
    context: &crate::shared::Context,
    image: Option<&str>,
) -> Result<(), anyhow::Error> {
    let mut sockets = VIRTUAL_SOCKETS.lock().await;
    if let Some(socket) = sockets.get_mut(&context.device) {
        let frame = SetImageFrame {
            event: "setImage",
            controller: &context.controller,
            position: context.position,
            image,
        };
        socket
            .send(Message::Text(serde_json::to_string(&frame)?.into()))
            .await?;
    }
    Ok(())
}

pub async fn init() {
    let listener = match TcpListener::bind(("localhost", PORT)).await {
        Ok(listener) => listener,
        Err(error) => {
            warn!("Failed to bind virtual device port {}: {}", PORT, error);
            return;
        }
    };

    let mut counter: u32 = 0;
    while let Ok((stream, _)) = listener.accept().await {
        counter += 1;
        tokio::spawn(handle_connection(stream, format!("vd-{}", counter)));
    }
}

async fn handle_connection(stream: TcpStream, id: String) {
    let stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!("Failed to complete WebSocket handshake: {}", error);
            return;
        }
    };
    info!("Virtual device {} connected", id);

    let (write, mut read) = stream.split();
    VIRTUAL_SOCKETS.lock().await.insert(id.clone(), write);

    let registered = crate::events::inbound::devices::register_device(
        "",
        crate::events::inbound::PayloadEvent {
            payload: crate::shared::DeviceInfo {
                id: id.clone(),
                name: "DeckHub Virtual Device".to_owned(),
                rows: super::prontokey::ROWS,
                columns: super::prontokey::COLUMNS,
                encoders: super::prontokey::ENCODERS,
                r#type: 7,
            },
        },
    )
    .await;
    if let Err(error) = registered {
        warn!("Failed to register virtual device: {}", error);
        VIRTUAL_SOCKETS.lock().await.remove(&id);
        return;
    }

    let mut state = RawState::default();
    while let Some(Ok(message)) = read.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let mut buffer = text.to_string();
        for frame in take_frames(&mut buffer) {
            for event in state.apply(&frame) {
                super::prontokey::dispatch(&id, event).await;
            }
        }
    }

    VIRTUAL_SOCKETS.lock().await.remove(&id);
    let _ = crate::events::inbound::devices::deregister_device(
        "",
        crate::events::inbound::PayloadEvent {
            payload: id.clone(),
        },
    )
    .await;
    info!("Virtual device {} disconnected", id);
}

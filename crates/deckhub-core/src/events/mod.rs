pub mod inbound;
pub mod outbound;

use inbound::RegisterEvent;

use std::collections::HashMap;

use futures::{SinkExt, StreamExt, stream::SplitSink};
use once_cell::sync::Lazy;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Socket bindings and pre-registration queues for one channel role.
///
/// Sockets and queues live under a single lock: a sender either writes to the
/// bound socket or appends to the queue, and registration drains the queue and
/// binds the socket, without either pair being interleaved. Queues are
/// deliberately unbounded.
#[derive(Default)]
struct Channels {
    sockets: HashMap<String, Sink>,
    queues: HashMap<String, Vec<Message>>,
}

impl Channels {
    fn enqueue(&mut self, uuid: &str, message: Message) {
        self.queues
            .entry(uuid.to_owned())
            .or_default()
            .push(message);
    }

    /// Remove and return the queue for a uuid, in enqueue order.
    fn take_queued(&mut self, uuid: &str) -> Vec<Message> {
        self.queues.remove(uuid).unwrap_or_default()
    }
}

static PLUGIN_CHANNELS: Lazy<Mutex<Channels>> = Lazy::new(|| Mutex::new(Channels::default()));
static PROPERTY_INSPECTOR_CHANNELS: Lazy<Mutex<Channels>> =
    Lazy::new(|| Mutex::new(Channels::default()));

pub async fn registered_plugins() -> Vec<String> {
    PLUGIN_CHANNELS
        .lock()
        .await
        .sockets
        .keys()
        .map(|x| x.to_owned())
        .collect()
}

/// Register a plugin or property inspector to send and receive events with its WebSocket.
pub async fn register_plugin(event: RegisterEvent, stream: WebSocketStream<TcpStream>) {
    let (mut write, read) = stream.split();
    match event {
        RegisterEvent::Register { uuid } => {
            log::debug!("Registered plugin {}", uuid);
            {
                let mut channels = PLUGIN_CHANNELS.lock().await;
                for message in channels.take_queued(&uuid) {
                    let _ = write.feed(message).await;
                }
                let _ = write.flush().await;
                channels.sockets.insert(uuid.clone(), write);
            }
            tokio::spawn(async move {
                let uuid = uuid;
                read.for_each(|event| inbound::process_incoming_message(event, &uuid))
                    .await;
                PLUGIN_CHANNELS.lock().await.sockets.remove(&uuid);
            });
        }
        RegisterEvent::RegisterPropertyInspector { uuid } => {
            log::debug!("Registered property inspector {}", uuid);
            {
                let mut channels = PROPERTY_INSPECTOR_CHANNELS.lock().await;
                for message in channels.take_queued(&uuid) {
                    let _ = write.feed(message).await;
                }
                let _ = write.flush().await;
                channels.sockets.insert(uuid.clone(), write);
            }
            tokio::spawn(async move {
                let uuid = uuid;
                read.for_each(|event| inbound::process_incoming_message_pi(event, &uuid))
                    .await;
                PROPERTY_INSPECTOR_CHANNELS.lock().await.sockets.remove(&uuid);
            });
        }
    };
}

/// Drop the channel of a property inspector whose action instance is gone.
///
/// Closes the socket if one is bound and discards any queued messages, so a
/// stale inspector can neither send nor receive under the dead context.
pub async fn unregister_property_inspector(context: &crate::shared::ActionContext) {
    let key = context.to_string();
    let mut channels = PROPERTY_INSPECTOR_CHANNELS.lock().await;
    channels.queues.remove(&key);
    if let Some(mut socket) = channels.sockets.remove(&key) {
        let _ = socket.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_drain_once_in_enqueue_order() {
        let mut channels = Channels::default();
        for n in 1..=3 {
            channels.enqueue("com.example.plugin", Message::Text(format!("{{\"n\":{n}}}")));
        }

        let drained = channels.take_queued("com.example.plugin");
        assert_eq!(
            drained,
            vec![
                Message::Text("{\"n\":1}".to_owned()),
                Message::Text("{\"n\":2}".to_owned()),
                Message::Text("{\"n\":3}".to_owned()),
            ]
        );
        assert!(channels.take_queued("com.example.plugin").is_empty());
    }

    #[tokio::test]
    async fn sends_before_registration_queue_in_order() {
        #[derive(serde::Serialize)]
        struct Ping {
            event: &'static str,
            n: u32,
        }

        let uuid = "com.example.preregistration";
        for n in 1..=2 {
            outbound::send_to_plugin(uuid, &Ping { event: "ping", n })
                .await
                .unwrap();
        }

        let mut channels = PLUGIN_CHANNELS.lock().await;
        let texts: Vec<String> = channels
            .take_queued(uuid)
            .into_iter()
            .map(|message| message.into_text().unwrap())
            .collect();
        assert_eq!(
            texts,
            vec![
                r#"{"event":"ping","n":1}"#.to_owned(),
                r#"{"event":"ping","n":2}"#.to_owned(),
            ]
        );
        assert!(channels.take_queued(uuid).is_empty());
    }

    #[tokio::test]
    async fn unregistering_a_property_inspector_discards_its_queue() {
        let context: crate::shared::ActionContext = "vd-0.Default.Keypad.0.0".parse().unwrap();
        PROPERTY_INSPECTOR_CHANNELS
            .lock()
            .await
            .enqueue(&context.to_string(), Message::Text("{}".to_owned()));

        unregister_property_inspector(&context).await;

        assert!(
            PROPERTY_INSPECTOR_CHANNELS
                .lock()
                .await
                .take_queued(&context.to_string())
                .is_empty()
        );
    }
}

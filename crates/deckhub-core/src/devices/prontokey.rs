//! Raw-protocol key decks speaking frame-delimited JSON over serial.
//!
//! The same frame format is shared by the virtual test device.

use crate::events::outbound::{encoder, keypad};

use std::io::Read as _;
use std::time::Duration;

use log::{error, warn};
use serde::Deserialize;

pub const ROWS: u8 = 3;
pub const COLUMNS: u8 = 3;
pub const ENCODERS: u8 = 2;
const DEVICE_TYPE: u8 = 7;

/// One frame of raw device input. Fields are optional; a frame carries only
/// the controls that changed.
#[derive(Deserialize)]
pub struct RawFrame {
    pub address: Option<String>,
    pub key: Option<i64>,
    pub slider0: Option<i64>,
    pub slider1: Option<i64>,
}

/// A normalized input event derived from raw frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    KeyDown(u8),
    KeyUp(u8),
    DialRotate(u8, i16),
}

/// Tracks raw readings across frames and converts them to edge events.
///
/// Keys report as one-based indices with zero meaning "no key held"; dials
/// report absolute positions that are diffed against the last baseline.
#[derive(Default)]
pub struct RawState {
    last_key: u8,
    last_sliders: [i16; 2],
}

impl RawState {
    pub fn apply(&mut self, frame: &RawFrame) -> Vec<RawEvent> {
        let mut events = Vec::new();

        if let Some(key) = frame.key {
            if key <= 0 {
                if self.last_key > 0 {
                    events.push(RawEvent::KeyUp(self.last_key - 1));
                    self.last_key = 0;
                }
            } else {
                let key = key as u8;
                events.push(RawEvent::KeyDown(key - 1));
                self.last_key = key;
            }
        }

        for (index, reading) in [frame.slider0, frame.slider1].into_iter().enumerate() {
            if let Some(value) = reading {
                let value = value as i16;
                let delta = value - self.last_sliders[index];
                // The baseline moves even when the delta is zero.
                self.last_sliders[index] = value;
                if delta != 0 {
                    events.push(RawEvent::DialRotate(index as u8, delta));
                }
            }
        }

        events
    }
}

/// Split buffered serial data into complete frames, returning the remainder.
pub fn take_frames(buffer: &mut String) -> Vec<RawFrame> {
    let mut frames = Vec::new();
    while let Some(index) = buffer.find('}') {
        let chunk = buffer[..=index].trim().to_owned();
        *buffer = buffer[(index + 1)..].to_owned();
        if let Ok(frame) = serde_json::from_str(&chunk) {
            frames.push(frame);
        }
    }
    frames
}

pub async fn dispatch(device: &str, event: RawEvent) {
    let result = match event {
        RawEvent::KeyDown(key) => keypad::key_down(device, key).await,
        RawEvent::KeyUp(key) => keypad::key_up(device, key).await,
        RawEvent::DialRotate(dial, ticks) => encoder::dial_rotate(device, dial, ticks).await,
    };
    if let Err(error) = result {
        warn!("Failed to process raw device event: {}", error);
    }
}

/// Attempt to open a serial connection with the device and handle incoming data.
pub async fn init(port_name: String) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(String, RawEvent)>();

    // Serial reads are blocking; keep them off the async workers.
    tokio::task::spawn_blocking(move || {
        let mut port = match serialport::new(&port_name, 57600)
            .timeout(Duration::from_millis(10))
            .open()
        {
            Ok(p) => p,
            Err(error) => {
                error!("Failed to open serial port {}: {}", port_name, error);
                return;
            }
        };
        let _ = port.write_all("register".as_bytes());

        let mut device_id: Option<String> = None;
        let mut state = RawState::default();
        let mut serial_buf: Vec<u8> = vec![0; 1024];
        let mut holding = String::new();

        loop {
            match port.read(serial_buf.as_mut_slice()) {
                Ok(count) => {
                    match std::str::from_utf8(&serial_buf[..count]) {
                        Ok(data) => holding += data,
                        Err(_) => break,
                    }
                    for frame in take_frames(&mut holding) {
                        // The first frame carries the device address; register then.
                        if device_id.is_none() {
                            if let Some(address) = &frame.address {
                                let id = format!("pk-{}", address);
                                register_blocking(id.clone());
                                device_id = Some(id);
                            }
                            continue;
                        }
                        let id = device_id.as_ref().unwrap();
                        for event in state.apply(&frame) {
                            if tx.send((id.clone(), event)).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(ref error) if error.kind() == std::io::ErrorKind::TimedOut => (),
                Err(error) => {
                    warn!("Failed to read serial message: {}", error);
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    });

    while let Some((device, event)) = rx.recv().await {
        dispatch(&device, event).await;
    }
}

fn register_blocking(id: String) {
    let handle = tokio::runtime::Handle::current();
    handle.spawn(async move {
        let result = crate::events::inbound::devices::register_device(
            "",
            crate::events::inbound::PayloadEvent {
                payload: crate::shared::DeviceInfo {
                    id,
                    name: "ProntoKey".to_owned(),
                    rows: ROWS,
                    columns: COLUMNS,
                    encoders: ENCODERS,
                    r#type: DEVICE_TYPE,
                },
            },
        )
        .await;
        if let Err(error) = result {
            error!("Failed to register serial device: {}", error);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(key: Option<i64>, slider0: Option<i64>, slider1: Option<i64>) -> RawFrame {
        RawFrame {
            address: None,
            key,
            slider0,
            slider1,
        }
    }

    #[test]
    fn key_press_and_release_synthesise_edges() {
        let mut state = RawState::default();
        assert_eq!(
            state.apply(&frame(Some(5), None, None)),
            vec![RawEvent::KeyDown(4)]
        );
        assert_eq!(
            state.apply(&frame(Some(0), None, None)),
            vec![RawEvent::KeyUp(4)]
        );
        // A release with nothing held is a no-op.
        assert_eq!(state.apply(&frame(Some(0), None, None)), vec![]);
        assert_eq!(
            state.apply(&frame(Some(5), None, None)),
            vec![RawEvent::KeyDown(4)]
        );
    }

    #[test]
    fn dial_deltas_are_relative_to_last_reading() {
        let mut state = RawState::default();
        assert_eq!(
            state.apply(&frame(None, Some(10), None)),
            vec![RawEvent::DialRotate(0, 10)]
        );
        assert_eq!(
            state.apply(&frame(None, Some(7), None)),
            vec![RawEvent::DialRotate(0, -3)]
        );
        // A repeated reading updates the baseline but emits nothing.
        assert_eq!(state.apply(&frame(None, Some(7), None)), vec![]);
        assert_eq!(
            state.apply(&frame(None, None, Some(2))),
            vec![RawEvent::DialRotate(1, 2)]
        );
    }

    #[test]
    fn combined_frame_orders_key_before_dials() {
        let mut state = RawState::default();
        let events = state.apply(&frame(Some(1), Some(4), None));
        assert_eq!(
            events,
            vec![RawEvent::KeyDown(0), RawEvent::DialRotate(0, 4)]
        );
    }

    #[test]
    fn frames_split_on_closing_brace() {
        let mut buffer = r#"{"key":1}{"slider0":3}{"key"#.to_owned();
        let frames = take_frames(&mut buffer);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].key, Some(1));
        assert_eq!(frames[1].slider0, Some(3));
        assert_eq!(buffer, r#"{"key"#);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut buffer = "not json}{\"key\":2}".to_owned();
        let frames = take_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].key, Some(2));
    }
}

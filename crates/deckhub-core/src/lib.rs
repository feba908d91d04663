//! DeckHub broker core.
//!
//! Connects control-surface hardware to third-party plugins over WebSocket
//! channels, without a hard dependency on any particular frontend.

pub mod application_watcher;
pub mod devices;
pub mod events;
pub mod lifecycle;
pub mod plugins;
pub mod shared;
pub mod store;

pub mod api;

pub mod ui;
pub mod webview;

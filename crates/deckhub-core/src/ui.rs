use crate::shared::{ActionContext, Context};

use once_cell::sync::OnceCell;
use tokio::sync::broadcast;

/// Events of interest to an attached configuration or rendering frontend.
#[derive(Debug, Clone)]
pub enum UiEvent {
    DevicesUpdated,
    SwitchProfile { device: String, profile: String },
    KeyMoved { context: Context, down: bool },
    ActionStateChanged { context: ActionContext },
    ShowAlert { context: Context },
    ShowOk { context: Context },
}

static UI_EVENTS: OnceCell<broadcast::Sender<UiEvent>> = OnceCell::new();

pub fn init(sender: broadcast::Sender<UiEvent>) {
    let _ = UI_EVENTS.set(sender);
}

pub fn subscribe() -> Option<broadcast::Receiver<UiEvent>> {
    UI_EVENTS.get().map(|s| s.subscribe())
}

pub fn emit(event: UiEvent) {
    if let Some(sender) = UI_EVENTS.get() {
        let _ = sender.send(event);
    }
}

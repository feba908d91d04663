//! High-level lifecycle helpers (shutdown).
//!
//! Frontends should call these to ensure DeckHub doesn't leave subprocesses running.

/// Best-effort global shutdown routine.
///
/// This focuses on subprocesses (plugins), since background tasks die with the runtime.
pub async fn shutdown_all() {
    crate::plugins::deactivate_all_plugins().await;
}

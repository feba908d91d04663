use deckhub_core::{application_watcher, devices, lifecycle, plugins, shared, ui};

use std::fs::OpenOptions;
use std::io::Write;

use fs2::FileExt;
use log::LevelFilter;
use tokio::sync::broadcast;

struct TeeLogger {
    stderr: env_logger::Logger,
    file: Option<std::sync::Mutex<std::fs::File>>,
}

impl log::Log for TeeLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.stderr.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        self.stderr.log(record);
        let Some(file) = self.file.as_ref() else {
            return;
        };
        // Best-effort: never let logging failures affect broker runtime.
        let mut file = file.lock().unwrap_or_else(|p| p.into_inner());
        let _ = writeln!(
            file,
            "{:?} {:<5} {} - {}",
            std::time::SystemTime::now(),
            record.level(),
            record.target(),
            record.args()
        );
        let _ = file.flush();
    }

    fn flush(&self) {
        self.stderr.flush();
        if let Some(file) = self.file.as_ref() {
            let mut file = file.lock().unwrap_or_else(|p| p.into_inner());
            let _ = file.flush();
        }
    }
}

fn init_logging() {
    // Configure and install a logger:
    // - still respects RUST_LOG (useful for debugging)
    // - always writes a persistent log file for launches where stderr is invisible
    //
    // NOTE: This must run after `shared::init_paths()` so `shared::log_dir()` is available.
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Info);
    }

    let stderr_logger = builder.build();

    let file = (|| {
        let dir = shared::log_dir();
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("deckhub.log");
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            return Some(std::sync::Mutex::new(f));
        }

        // Fallback: config dir, so we always get *some* file even if the
        // data dir is missing or unwritable.
        let cfg = shared::config_dir();
        let _ = std::fs::create_dir_all(&cfg);
        let f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(cfg.join("deckhub.log"))
            .ok()?;
        Some(std::sync::Mutex::new(f))
    })();

    let _ = log::set_boxed_logger(Box::new(TeeLogger {
        stderr: stderr_logger,
        file,
    }));
    // Let the inner logger handle filtering; keep max_level permissive.
    log::set_max_level(LevelFilter::Trace);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::init_paths(shared::discover_paths()?);
    init_logging();

    log::info!(
        "{} v{} starting (pid={})",
        shared::PRODUCT_NAME,
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );
    log::info!("config_dir={}", shared::config_dir().display());
    log::info!("log_dir={}", shared::log_dir().display());

    // Single instance: lockfile + PID. Two brokers would fight over the same
    // ports and hardware handles.
    std::fs::create_dir_all(shared::config_dir())?;
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(shared::config_dir().join("deckhub.lock"))?;
    if lock_file.try_lock_exclusive().is_err() {
        log::warn!("{} is already running (lockfile held)", shared::PRODUCT_NAME);
        return Ok(());
    }
    let _ = lock_file.set_len(0);
    let _ = writeln!(lock_file, "{}", std::process::id());

    let (ui_tx, _ui_rx) = broadcast::channel(256);
    ui::init(ui_tx);

    plugins::initialise_plugins();
    devices::initialise_devices().await;
    application_watcher::init_application_watcher();

    wait_for_shutdown_signal().await;

    log::info!("Shutting down");
    lifecycle::shutdown_all().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

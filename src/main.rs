//! # Cat Tracker
//!
//! Runs the tracker core on a workstation, with the host stand-ins in place
//! of the device drivers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cat_tracker::codec::JsonCodec;
use cat_tracker::collab::{FileConfigStore, SystemClock};
use cat_tracker::config::{Config, LoggingConfig};
use cat_tracker::host::{
    FixedEnvironment, HostBootConfirm, HostReboot, IdleAccelerometer, IdleButtons, LogLeds,
    LoopbackTransport, SimulatedGps, SimulatedModem,
};
use cat_tracker::manager::EventBus;
use cat_tracker::tracker::{Collaborators, Tracker};

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the configuration file
const CONFIG_ENV_VAR: &str = "CAT_TRACKER_CONFIG";

/// File name prefix of the daily rolling log
const LOG_FILE_PREFIX: &str = "cat-tracker.log";

/// Main entry point for the Cat Tracker application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, `CAT_TRACKER_CONFIG`, or the default path)
///    - Set up logging, optionally to a daily rolling file as well
///    - Wire the host collaborators and spawn every manager
///
/// 2. **Run**
///    - Managers run until Ctrl+C or until the tracker asks for a reboot
///
/// 3. **Shutdown**
///    - Ctrl+C raises a fatal error so every manager shuts down in order
///    - The process exits once the reboot handler fires
///
/// # Errors
///
/// Returns error if the configuration file exists but cannot be parsed or
/// fails validation.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path(
        std::env::args().nth(1),
        std::env::var(CONFIG_ENV_VAR).ok(),
    );
    let config = load_config(&config_path)?;
    let _log_guard = init_logging(&config.logging);

    info!("Cat Tracker v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_path.display());

    let clock = Arc::new(SystemClock::new());
    let reboot = HostReboot::new();
    let collab = Collaborators {
        transport: Box::new(LoopbackTransport::new(config.cloud.client_id.clone())),
        codec: Box::new(JsonCodec::new()),
        boot: Box::new(HostBootConfirm),
        gps: Box::new(SimulatedGps::new()),
        modem: Box::new(SimulatedModem::new(clock.clone())),
        environment: Some(Box::new(FixedEnvironment::default())),
        accelerometer: Box::new(IdleAccelerometer),
        buttons: Box::new(IdleButtons),
        leds: Box::new(LogLeds),
        store: Box::new(FileConfigStore::new(&config.data.settings_path)),
        reboot: Box::new(reboot.clone()),
        clock,
    };

    let bus = Arc::new(EventBus::new());
    let tracker = Tracker::spawn(&config, bus, collab);
    info!("Press Ctrl+C to exit");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            tracker.util().fatal_error("interrupted");
            reboot.requested().await;
        }
        _ = reboot.requested() => {}
    }

    tracker.abort();
    info!("Stopped");
    Ok(())
}

/// Pick the configuration file from the CLI argument, then the environment
fn resolve_config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the configuration, falling back to defaults when the file is missing
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &logging.file_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

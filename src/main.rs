//! Controller Deck
//!
//! Bridges a serial slider/button deck to master and per-application
//! volume, hotkeys and text input.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use controller_deck::api::{self, ApiState};
use controller_deck::capabilities::{Capabilities, ConsoleBackend};
use controller_deck::config::{AppConfig, ConfigWatcher, SerialOverrides};
use controller_deck::control::DeckControl;
use controller_deck::events::EventHub;
use controller_deck::link::SerialLink;
use controller_deck::paths::AppPaths;
use controller_deck::pipeline::{Pipeline, SharedMapping};
use controller_deck::ports;

/// Controller Deck - sliders and buttons over serial to volume, hotkeys and text
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: detected per install mode)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Override the configured serial port ("auto" picks the last one)
    #[arg(short, long, env = "DECK_PORT")]
    port: Option<String>,

    /// Override the configured baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Do not start the HTTP API
    #[arg(long)]
    no_api: bool,

    /// Log to the console only
    #[arg(long)]
    no_log_file: bool,

    /// Emit console logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn serial_overrides(&self) -> SerialOverrides {
        SerialOverrides {
            port: self.port.clone(),
            baud: self.baud,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.list_ports {
        ports::list_ports_formatted();
        return Ok(());
    }

    let paths = match &args.config {
        Some(path) => AppPaths::for_config(path),
        None => AppPaths::detect(),
    };
    paths.ensure_directories()?;

    let _log_guard = init_logging(
        &args.log_level,
        args.log_json,
        (!args.no_log_file).then_some(&paths),
    )?;

    info!("Starting Controller Deck v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    let config_path = paths.config.to_string_lossy().to_string();
    let (config_watcher, initial_config) = ConfigWatcher::new(config_path.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    run_app(
        (*initial_config).clone(),
        config_path,
        config_watcher,
        &args,
        shutdown_signal(),
    )
    .await?;

    info!("Controller Deck shutdown complete");
    Ok(())
}

async fn run_app(
    file_config: AppConfig,
    config_path: String,
    mut config_watcher: ConfigWatcher,
    args: &Args,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let backend = Arc::new(ConsoleBackend::new());
    let caps = Capabilities::from_backend(backend);
    info!("Using console capability backend");

    let overrides = args.serial_overrides();
    let mut config = file_config.clone();
    overrides.apply(&mut config);

    // an unopenable port at startup is fatal
    let serial = config.serial.clone();
    let link = tokio::task::spawn_blocking(move || SerialLink::open(&serial))
        .await
        .context("Serial connect task failed")??;
    let link = Arc::new(link);

    let mapping = Arc::new(SharedMapping::new(config.to_mapping()?, config.tuning()));
    let control = Arc::new(DeckControl::new(
        link.clone(),
        mapping.clone(),
        file_config,
        overrides,
        config_path,
    ));
    let hub = Arc::new(EventHub::new());
    let cancel = CancellationToken::new();

    let pipeline = Pipeline::new(link.slot(), mapping, hub.clone(), caps.clone());
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let poll_thread = {
        let cancel = cancel.clone();
        std::thread::Builder::new()
            .name("deck-poll".to_string())
            .spawn(move || pipeline.run(cancel, poll_interval))
            .context("Failed to spawn poll thread")?
    };

    let api_task = if config.api.enabled && !args.no_api {
        let state = Arc::new(ApiState {
            control: control.clone(),
            hub: hub.clone(),
            caps: caps.clone(),
            heartbeat: Duration::from_millis(config.api.heartbeat_ms.max(1)),
            shutdown: cancel.clone(),
        });
        let host = config.api.host.clone();
        let port = config.api.port;
        Some(tokio::spawn(async move {
            if let Err(e) = api::start_server(state, &host, port).await {
                error!("API server stopped: {:#}", e);
            }
        }))
    } else {
        info!("HTTP API disabled");
        None
    };

    info!("✅ Ready - move a slider or press a button");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                match control.apply(new_config).await {
                    Ok(()) => info!("✅ Configuration reloaded"),
                    Err(e) => warn!("⚠️  Failed to apply config (keeping old config): {:#}", e),
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping");
                break;
            }
        }
    }

    info!("Shutting down...");
    cancel.cancel();

    if let Some(task) = api_task {
        if let Err(e) = task.await {
            warn!("API task ended abnormally: {}", e);
        }
    }

    tokio::task::spawn_blocking(move || {
        if poll_thread.join().is_err() {
            error!("Poll thread panicked");
        }
        link.stop();
    })
    .await
    .context("Shutdown task failed")?;

    info!("Serial connection closed");
    Ok(())
}

fn init_logging(
    level: &str,
    json: bool,
    paths: Option<&AppPaths>,
) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (console, console_json) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);
        (Some(layer), None)
    };

    let (file, guard) = match paths {
        Some(paths) => {
            let appender = tracing_appender::rolling::daily(&paths.logs_dir, "controller-deck.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(console_json)
        .with(file)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

//! Sustain GW - MIDI router
//!
//! Forwards a MIDI input to a MIDI output with channel filtering, channel
//! remapping and momentary/latched sustain retention.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sustain_gw::cli::{self, Command};
use sustain_gw::config::{AppConfig, ConfigWatcher, InputChannelSetting};
use sustain_gw::ports::{self, InputPorts, OutputPort, INBOUND_QUEUE_SIZE};
use sustain_gw::router::SustainMode;
use sustain_gw::{CommandOutcome, Session};

/// Sustain GW - MIDI router with channel remapping and sustain latch
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Start the interactive command prompt
    #[arg(short, long)]
    interactive: bool,

    /// Input port name pattern, or "any" for every device
    #[arg(long, env = "SUSTAIN_GW_INPUT")]
    input: Option<String>,

    /// Output port name pattern
    #[arg(long, env = "SUSTAIN_GW_OUTPUT")]
    output: Option<String>,

    /// Input channel filter: "any" or 1-16
    #[arg(long, value_parser = parse_input_channel)]
    input_channel: Option<InputChannelSetting>,

    /// Output channel (1-16)
    #[arg(long)]
    output_channel: Option<u8>,

    /// Start with latched sustain
    #[arg(long)]
    latch: bool,
}

fn parse_input_channel(value: &str) -> Result<InputChannelSetting, String> {
    let setting = match value.parse::<u8>() {
        Ok(number) => InputChannelSetting::Number(number),
        Err(_) => InputChannelSetting::Keyword(value.to_string()),
    };
    setting.filter().map_err(|e| e.to_string())?;
    Ok(setting)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    info!("Starting Sustain GW...");

    if args.list_ports {
        ports::print_ports()?;
        return Ok(());
    }

    // Load configuration, with hot-reload when the file exists
    let (config_watcher, mut config) = if Path::new(&args.config).exists() {
        let (watcher, config) = ConfigWatcher::new(args.config.clone()).await?;
        info!("Configuration loaded from {} with hot-reload enabled", args.config);
        (Some(watcher), config)
    } else {
        warn!("Configuration file {} not found, using defaults", args.config);
        (None, AppConfig::default())
    };

    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    run_app(
        config,
        &args.config,
        config_watcher,
        args.interactive,
        shutdown_signal(),
    )
    .await?;

    info!("Sustain GW shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(input) = &args.input {
        config.midi.input_port = input.clone();
    }
    if let Some(output) = &args.output {
        config.midi.output_port = output.clone();
    }
    if let Some(input_channel) = &args.input_channel {
        config.routing.input_channel = input_channel.clone();
    }
    if let Some(output_channel) = args.output_channel {
        config.routing.output_channel = output_channel;
    }
    if args.latch {
        config.routing.sustain = SustainMode::Latched;
    }
}

async fn run_app(
    config: AppConfig,
    config_path: &str,
    mut config_watcher: Option<ConfigWatcher>,
    interactive: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    // Every input device feeds this one queue
    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let inputs = InputPorts::connect(
        &config.midi.input_port,
        config.listens_to_any_device(),
        inbound_tx,
    )?;
    info!("Listening on: {}", inputs.names().join(", "));

    let output = OutputPort::connect(&config.midi.output_port)?;
    info!("Sending to: {}", output.name());

    let mut session = Session::new(config, output)?;
    info!("Routing: {}", session.router().status());

    let (command_tx, mut command_rx) = mpsc::channel::<Command>(16);
    if interactive {
        std::thread::spawn(move || {
            if let Err(e) = cli::run_repl(command_tx) {
                warn!("Command prompt stopped: {}", e);
            }
        });
    } else {
        drop(command_tx);
    }

    info!("Ready to route MIDI events!");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = inbound_rx.recv() => {
                session.on_inbound(event);
            }

            Some(command) = command_rx.recv() => {
                match session.on_command(command) {
                    CommandOutcome::Continue => {}
                    CommandOutcome::Save => match session.config().save(config_path).await {
                        Ok(()) => info!("💾 Configuration saved to {}", config_path),
                        Err(e) => warn!("⚠️  Failed to save config: {:#}", e),
                    },
                    CommandOutcome::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }

            Some(new_config) = next_config(&mut config_watcher) => {
                info!("📝 Configuration file changed, reloading...");
                if let Err(e) = session.on_config(new_config) {
                    warn!("⚠️  Failed to apply config (keeping old config): {:#}", e);
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    let output = session.finish();
    inputs.close();
    output.close();

    Ok(())
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sustain-gw.log");
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
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

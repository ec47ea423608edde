//! Sinc Controller - Entry Point
//!
//! Runs the keyboard session in the foreground: HID events are delivered on a
//! background thread, domain events and console commands are handled here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hidapi::HidApi;
use sinc_controller::{
    attach,
    console::{ConsoleCommand, Outcome},
    hid, signal, Config, DomainEvent, EventSender, HidManager, KeyboardSession, SessionError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sinc-controller", about = "Sinc keyboard layer controller")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Track the keyboard and accept commands on stdin (default)
    Watch,
    /// List matching HID interfaces
    List,
    /// Print the effective configuration
    PrintConfig,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => run_watch(config),
        Commands::List => list(&config),
        Commands::PrintConfig => print_config(&config, cli.config),
    }
}

fn list(config: &Config) -> Result<()> {
    let api = HidApi::new().context("Failed to initialize HID API")?;
    let devices = hid::list_devices(&api, &config.hid);

    if devices.is_empty() {
        println!(
            "No Sinc keyboard found (VID: 0x{:04X}, PID: 0x{:04X}, Usage: 0x{:04X}/0x{:02X})",
            config.hid.vendor_id, config.hid.product_id, config.hid.usage_page, config.hid.usage_id
        );
        return Ok(());
    }

    for device in devices {
        println!(
            "{} {} [{}] {}",
            device.manufacturer,
            device.product,
            device.serial.as_deref().unwrap_or("-"),
            device.path
        );
    }
    Ok(())
}

fn print_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(())
}

fn run_watch(config: Config) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(watch(config))
}

async fn watch(config: Config) -> Result<()> {
    info!("Starting Sinc controller");

    let (events, mut event_rx) = EventSender::channel();
    let session = Arc::new(KeyboardSession::new(config.session.clone(), Arc::new(events)));

    let mut manager = HidManager::new(config.hid.clone());
    attach(&session, &mut manager);
    manager.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = signal::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => log_event(event),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if run_command(&session, &line) == Some(Outcome::Quit) {
                        break;
                    }
                }
                Ok(None) => {
                    // Detached from a terminal; keep running until a signal
                    info!("stdin closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            received = &mut shutdown => {
                info!("Received {}, shutting down", received);
                break;
            }
        }
    }

    session.shutdown();
    manager.stop();
    info!("Sinc controller stopped");
    Ok(())
}

fn run_command(session: &KeyboardSession, line: &str) -> Option<Outcome> {
    let command = match line.parse::<ConsoleCommand>() {
        Ok(command) => command,
        Err(e) => {
            println!("{}", e);
            return None;
        }
    };

    match command.execute(session) {
        Ok(Outcome::Print(text)) => {
            println!("{}", text);
            None
        }
        Ok(outcome) => Some(outcome),
        Err(SessionError::NotConnected) => {
            println!("keyboard is not connected");
            None
        }
        Err(e) => {
            warn!("Command {:?} failed: {}", command, e);
            None
        }
    }
}

fn log_event(event: DomainEvent) {
    match event {
        DomainEvent::ConnectionChanged(true) => println!("connected"),
        DomainEvent::ConnectionChanged(false) => println!("disconnected"),
        DomainEvent::LayerChanged(layer) => println!("layer: {}", layer),
        DomainEvent::KeyEnablementChanged(enabled) => {
            println!("layer key: {}", if enabled { "enabled" } else { "disabled" })
        }
    }
}

//! `scale-reader` binary entry point.
//!
//! Connects to a weighbridge indicator, detects its line settings and prints
//! every accepted reading until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Prompt for a port, probe it and stream readings
//! scale-reader
//!
//! # Fixed port, JSON lines, stop at the first stable weight
//! scale-reader --port /dev/ttyUSB0 --json --once
//! ```

use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use weighbridge_scale::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use weighbridge_scale::{
    ConnectionStatus, PortSelection, Reading, ReaderSettings, ScaleReader, SerialPortTransport,
};

/// How often the CLI checks whether the connection is still alive.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Reads weight lines from a serial weighbridge indicator.",
    long_about = "Opens a serial port, brute-forces the scale's baud rate, parity and data bits, \
                  then prints every decoded weight reading."
)]
struct Args {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to use instead of prompting
    #[arg(short, long)]
    port: Option<String>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Exit after the first stable weight
    #[arg(long)]
    once: bool,

    /// Print readings as JSON lines
    #[arg(long)]
    json: bool,

    /// Send the request command at this interval
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Override the per-candidate probe window
    #[arg(long, value_name = "MS")]
    probe_window_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.list_ports {
        list_ports()?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&args)?;
    init_tracing(&config.logging);
    debug!(?config, "Configuration loaded");

    let selection = match config.serial.port.clone() {
        Some(name) => PortSelection::Named(name),
        None => PortSelection::Prompt,
    };
    let mut reader = ScaleReader::new(
        SerialPortTransport::new(selection),
        ReaderSettings::from(&config),
    );

    info!(
        "Probing up to {} configuration(s), worst case {:?}",
        reader.settings().probe.candidates.len(),
        reader.settings().probe.worst_case_latency()
    );

    let active = match reader.connect().await {
        Ok(active) => active,
        Err(e) if e.is_user_cancelled() => {
            eprintln!("{}", e);
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    eprintln!("Connected ({})", active);

    let code = stream_readings(&mut reader, &args).await?;
    reader.disconnect().await;
    Ok(code)
}

async fn stream_readings(
    reader: &mut ScaleReader<SerialPortTransport>,
    args: &Args,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut readings = reader.subscribe();
    let mut poll = args.poll_interval_ms.filter(|ms| *ms > 0).map(|ms| {
        let mut ticker = interval(Duration::from_millis(ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut health = interval(HEALTH_CHECK_INTERVAL);

    // Readings decoded while probing are already in the session.
    if args.once {
        if let Some(weight) = reader.stable_weight() {
            print_weight(weight, args.json)?;
            return Ok(ExitCode::SUCCESS);
        }
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                return Ok(ExitCode::SUCCESS);
            }
            item = readings.next() => {
                match item {
                    Some(Ok(reading)) => {
                        print_reading(&reading, args.json)?;
                        if args.once && reading.stable {
                            return Ok(ExitCode::SUCCESS);
                        }
                    }
                    Some(Err(e)) => warn!("Reading subscriber fell behind: {}", e),
                    None => return Ok(ExitCode::FAILURE),
                }
            }
            _ = tick(&mut poll) => {
                reader.request_weight().await;
            }
            _ = health.tick() => {
                if reader.connection_status() == ConnectionStatus::Disconnected {
                    let reason = reader
                        .last_error()
                        .unwrap_or_else(|| "connection lost".to_string());
                    eprintln!("Error: {}", reason);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn print_reading(reading: &Reading, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(reading)?);
    } else {
        println!(
            "{}  {}",
            reading.captured_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            reading
        );
    }
    Ok(())
}

fn print_weight(weight_kg: f64, json: bool) -> Result<(), serde_json::Error> {
    if json {
        let value = serde_json::json!({ "weight_kg": weight_kg, "stable": true });
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("{} kg stable", weight_kg);
    }
    Ok(())
}

fn list_ports() -> Result<(), serialport::Error> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(info) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                info.vid,
                info.pid,
                info.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config, weighbridge_scale::ConfigError> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?.into_config(),
        None => match ConfigLoader::load() {
            Ok(loader) => loader.into_config(),
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {}", e);
                ConfigLoader::with_defaults().into_config()
            }
        },
    };

    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(ms) = args.probe_window_ms {
        config.probe.probe_window_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

/// Install the global subscriber on stderr; `RUST_LOG` wins over the config.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

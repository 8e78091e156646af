//! # Control Server Entry Point
//!
//! Loads configuration (YAML file, then command-line overrides), binds the
//! listener and serves command sessions until killed.
//!
//! ## Usage
//! ```text
//! rts_control --config rts.yml --port 9999 --period-ms 10 --echo 50
//! RUST_LOG=debug rts_control --io plant
//! ```

use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use log::info;

use rts_control::{
    config::{Config, IoBackend},
    server::Listener,
};

#[derive(Debug, Parser)]
#[command(name = "rts_control", about = "Real-time two-channel control server")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Initial loop period in milliseconds
    #[arg(long)]
    period_ms: Option<f64>,

    /// Echo every n-th tick to the console (0 disables)
    #[arg(short, long)]
    echo: Option<u32>,

    /// Sensor/actuator backend: random or plant
    #[arg(long, value_parser = parse_backend)]
    io: Option<IoBackend>,

    /// Export each session's log as CSV into this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Keep the timer thread at normal priority
    #[arg(long)]
    no_realtime: bool,
}

fn parse_backend(value: &str) -> Result<IoBackend, String> {
    match value {
        "random" => Ok(IoBackend::Random),
        "plant" => Ok(IoBackend::Plant),
        other => Err(format!("unknown io backend '{other}' (expected random or plant)")),
    }
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(period_ms) = self.period_ms {
            config.period_ms = period_ms;
        }
        if let Some(echo) = self.echo {
            config.echo_divisor = echo;
        }
        if let Some(io) = self.io {
            config.io = io;
        }
        if self.export_dir.is_some() {
            config.export_dir = self.export_dir;
        }
        if self.no_realtime {
            config.realtime_priority = false;
        }
        config
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = cli.apply(config);
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting control server: period {} ms, echo {}, io {:?}",
        config.period_ms, config.echo_divisor, config.io
    );

    let address = config.address();
    let listener = Listener::bind(config).with_context(|| format!("Failed to bind {address}"))?;
    listener.serve();
    Ok(())
}

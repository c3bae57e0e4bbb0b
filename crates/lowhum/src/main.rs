//! lowhum: plays a long, seamlessly looping brown-noise file on an output device.
//!
//! ## Commands
//! - `start`: generate the asset on first run, then stream it until Ctrl+C or
//!   until the output device disappears.
//! - `devices`: list output devices.
//! - `generate`: build (or rebuild with `--force`) the asset without playing it.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lowhum::cli::{Args, Command};
use lowhum::config::AppConfig;
use lowhum::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_or_default(args.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    match args.cmd {
        Command::Start { device } => runtime::run_start(&config, device),
        Command::Devices { json } => runtime::run_devices(json),
        Command::Generate { force } => runtime::run_generate(&config, force),
    }
}

//! Open, stream and inspect files on behalf of callers that cannot.
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error};

mod app_config;
mod daemon;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Delegated file-system executor.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to an fs-proxy config TOML."
    )]
    config_path: Option<PathBuf>,
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let config = match Config::load(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(app_config::ConfigError::ValidationErrors(error_messages)) => {
            eprintln!("Configuration is invalid.");
            for msg in &error_messages {
                eprintln!(" - {msg}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Trc::default().init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }

    debug!(config = ?config, "Starting with configuration...");
    if let Err(e) = daemon::spawn(config) {
        error!("Daemon failed: {e}");
        std::process::exit(1);
    }
}

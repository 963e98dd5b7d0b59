//! ScaraLink - serial bridge daemon for a SCARA robot controller
//!
//! ## Architecture
//!
//! - **Link supervisor**: one background task that discovers the controller
//!   on a serial port, keeps the session alive, and retries on any fault
//! - **TCP server (port 9000)**: clients send opaque command lines and
//!   receive JSON status/position events

use scara_link::config::AppConfig;
use scara_link::error::Result;
use scara_link::registry::ClientRegistry;
use scara_link::supervisor::{SerialLocator, SupervisorHandle};
use scara_link::{error, server};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default config location when no path is given
const DEFAULT_CONFIG_PATH: &str = "/etc/scara-link.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `scara-link <path>` (positional)
/// - `scara-link --config <path>` (flag-based)
/// - `scara-link -c <path>` (short flag)
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

/// Load the config from an explicit path, the default path, or defaults
fn load_config() -> Result<AppConfig> {
    if let Some(path) = parse_config_path() {
        log::info!("Using config: {}", path);
        return AppConfig::from_file(&path);
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        log::info!("Using config: {}", DEFAULT_CONFIG_PATH);
        return AppConfig::from_file(DEFAULT_CONFIG_PATH);
    }
    log::info!("No config file found, using built-in defaults");
    Ok(AppConfig::default())
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("ScaraLink v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    log::info!(
        "Controller signatures: {:?} at {} baud",
        config.serial.signatures,
        config.serial.baud_rate
    );

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| error::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let registry = ClientRegistry::new();

    // The supervisor is built here but starts with the first client
    let locator = SerialLocator::new(config.serial.clone());
    let supervisor = SupervisorHandle::new(
        Box::new(locator),
        registry.clone(),
        config.supervisor.clone(),
        Arc::clone(&running),
    );

    log::info!("ScaraLink running. Press Ctrl-C to stop.");
    server::serve(
        &config.network.bind_address,
        registry,
        supervisor,
        running,
    )?;

    log::info!("ScaraLink stopped");
    Ok(())
}

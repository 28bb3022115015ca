//! RoCam IO - gimbal control and tracking daemon
//!
//! ## Interfaces
//!
//! - **Serial**: gimbal firmware (CRC-8 request/response)
//! - **TCP (default 127.0.0.1:5561)**: detection stream from the producer
//! - **TCP (default 127.0.0.1:5560)**: control socket (status, mode, moves, arm)

use log::LevelFilter;
use rocam_io::config::{AppConfig, LoggingConfig};
use rocam_io::error::{Error, Result};
use rocam_io::RocamSystem;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/rocam.toml";

/// Config file from `-c <path>`, `--config <path>` or the first bare argument
fn parse_config_path<I: IntoIterator<Item = String>>(args: I) -> String {
    let mut args = args.into_iter().skip(1);
    let mut positional = None;
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        } else if positional.is_none() && !arg.starts_with('-') {
            positional = Some(arg);
        }
    }
    positional.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Start the logger before the config is read
///
/// With `RUST_LOG` set, its filters apply and the config level is ignored.
/// Otherwise every record reaches the logger and the global max level is
/// narrowed once the config is known. Returns true when `RUST_LOG` is in
/// control.
fn init_logging() -> bool {
    let from_env = env::var_os("RUST_LOG").is_some();
    if from_env {
        env_logger::Builder::from_default_env().init();
    } else {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Trace)
            .init();
        log::set_max_level(LevelFilter::Info);
    }
    from_env
}

/// Level requested by the config, `info` if unrecognised
fn configured_level(logging: &LoggingConfig) -> LevelFilter {
    logging.level.trim().parse().unwrap_or_else(|_| {
        log::warn!("Unknown log level '{}', using info", logging.level);
        LevelFilter::Info
    })
}

fn main() -> Result<()> {
    let env_controls_logging = init_logging();

    let config_path = parse_config_path(env::args());
    let config = AppConfig::load_or_default(&config_path)?;
    if !env_controls_logging {
        log::set_max_level(configured_level(&config.logging));
    }

    log::info!("RoCam IO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    log::info!(
        "Gimbal: {} @ {} baud (strict_ack={})",
        config.gimbal.port,
        config.gimbal.baud_rate,
        config.gimbal.strict_ack
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let system = RocamSystem::start(&config, Arc::clone(&running))?;
    log::info!(
        "RoCam IO running (control {}, detections {}). Press Ctrl-C to stop.",
        system.control_addr(),
        system.detection_addr()
    );

    while system.is_running() {
        thread::sleep(Duration::from_millis(100));
    }

    system.shutdown();
    Ok(())
}

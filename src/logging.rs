// DriftClock Logging
// tracing subscriber writing to stderr and <data>/debug.log

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ClockError, Result};

pub const LOG_FILE: &str = "debug.log";

/// Default filter for a `-v` count; `RUST_LOG` takes precedence.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. With `data_dir` set, a plain-text copy
/// of every event is appended to `debug.log` in that directory.
pub fn init_logging(data_dir: Option<&Path>, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let file_layer = match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| ClockError::io_at(dir, e))?;
            let path = dir.join(LOG_FILE);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| ClockError::io_at(&path, e))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| ClockError::Config(format!("logging already initialised: {}", e)))
}

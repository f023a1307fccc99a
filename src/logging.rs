// src/logging.rs
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogsConfig;

/// Installs two sinks: everything below ERROR goes to the info log (stdout
/// by default), ERROR goes to the error log (stderr by default).
///
/// `RUST_LOG` still applies unless `verbose` forces debug output.
pub fn init(logs: &LogsConfig, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let info_writer = match &logs.info {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log(path)?)),
        None => BoxMakeWriter::new(io::stdout),
    };
    let error_writer = match &logs.error {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log(path)?)),
        None => BoxMakeWriter::new(io::stderr),
    };

    let info_layer = fmt::layer()
        .with_ansi(false)
        .with_target(verbose)
        .with_writer(info_writer)
        .with_filter(filter_fn(|metadata| *metadata.level() != Level::ERROR));

    let error_layer = fmt::layer()
        .with_ansi(false)
        .with_target(verbose)
        .with_writer(error_writer)
        .with_filter(LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(info_layer)
        .with(error_layer)
        .try_init()
        .context("Failed to install the log subscriber")
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

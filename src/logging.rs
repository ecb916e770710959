// src/logging.rs

use std::fs::{create_dir_all, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    /// Filter directive for this crate and sqlx
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "dbpool=debug,sqlx=debug",
            LogLevel::Info => "dbpool=info,sqlx=warn",
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. With `log_file` the output is
/// appended to that file (parent directories are created) instead of stderr.
/// Fails if a subscriber is already installed.
pub fn init(level: LogLevel, log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match log_file {
        Some(path) => {
            if let Some(dir) = Path::new(path).parent() {
                create_dir_all(dir)
                    .with_context(|| format!("Error creating log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("Error opening log file {}", path))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

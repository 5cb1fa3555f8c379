//! Log sink setup
//!
//! Events are plain `tracing` calls everywhere else in the crate. This module
//! decides where they go: console, a per-run log file, both, or nowhere.
//! Every line reads `[YYYY/MM/DD - HH:MM:SS] <event text>`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Silent operation
    None,
    /// Console echo only
    Console,
    /// Log file only
    File,
    /// Console and log file
    Both,
}

impl LogMode {
    /// Map the console and verbose flags to a mode
    pub fn from_flags(console: bool, verbose: bool) -> Self {
        match (console, verbose) {
            (true, true) => LogMode::Both,
            (true, false) => LogMode::Console,
            (false, true) => LogMode::File,
            (false, false) => LogMode::None,
        }
    }

    pub fn console(self) -> bool {
        matches!(self, LogMode::Console | LogMode::Both)
    }

    pub fn file(self) -> bool {
        matches!(self, LogMode::File | LogMode::Both)
    }
}

/// Keeps the file writer alive; pending lines are flushed on drop
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// `[YYYY/MM/DD - HH:MM:SS]` in local time
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketTime;

impl FormatTime for BracketTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_timestamp(Local::now()))
    }
}

pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format("[%Y/%m/%d - %H:%M:%S]").to_string()
}

/// Per-run log file name, e.g. `keepalive_log_20261017_093000.txt`
pub fn log_file_name(started: DateTime<Local>) -> String {
    started.format("keepalive_log_%Y%m%d_%H%M%S.txt").to_string()
}

pub fn init_logging(mode: LogMode, logs_dir: &Path, level: &str) -> Result<LogGuard> {
    if mode == LogMode::None {
        return Ok(LogGuard { _file: None });
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console_layer = mode.console().then(|| {
        tracing_subscriber::fmt::layer()
            .with_timer(BracketTime)
            .with_writer(std::io::stdout)
            .with_ansi(false)
            .with_level(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });

    let (file_layer, guard) = if mode.file() {
        std::fs::create_dir_all(logs_dir).with_context(|| {
            format!("Failed to create logs directory: {}", logs_dir.display())
        })?;
        let appender = tracing_appender::rolling::never(logs_dir, log_file_name(Local::now()));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_timer(BracketTime)
            .with_writer(writer)
            .with_ansi(false)
            .with_level(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(LogGuard { _file: guard })
}

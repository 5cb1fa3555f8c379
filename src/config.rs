//! Configuration management for Audio KeepAlive
//!
//! Settings come from an optional YAML file; command-line flags override
//! them. The result is a resolved [`KeepAliveConfig`] handed to the core.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::logging::LogMode;
use crate::paths::AppPaths;
use crate::playback::Tone;

/// Settings file contents
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocklist: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    #[serde(default)]
    pub watch_blocklist: bool,
    #[serde(default)]
    pub tone: Tone,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            call_timeout_ms: default_call_timeout(),
            blocklist: None,
            logs_dir: None,
            watch_blocklist: false,
            tone: Tone::default(),
        }
    }
}

/// Values given on the command line; `None`/`false` leaves the file value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub console: bool,
    pub verbose: bool,
    pub blocklist: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub watch_blocklist: bool,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAliveConfig {
    pub log_mode: LogMode,
    pub blocklist_path: PathBuf,
    pub logs_dir: PathBuf,
    pub poll_interval: Duration,
    pub call_timeout: Duration,
    pub watch_blocklist: bool,
    pub tone: Tone,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the settings file if it exists, defaults otherwise
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(50..=5000).contains(&self.poll_interval_ms) {
            anyhow::bail!(
                "poll_interval_ms {} out of range (must be 50-5000)",
                self.poll_interval_ms
            );
        }
        if self.call_timeout_ms == 0 || self.call_timeout_ms >= 10_000 {
            anyhow::bail!(
                "call_timeout_ms {} out of range (must be 1-9999)",
                self.call_timeout_ms
            );
        }
        let freq = self.tone.frequency_hz;
        if !freq.is_finite() || !(1.0..=22_000.0).contains(&freq) {
            anyhow::bail!("tone.frequency_hz {} out of range (must be 1-22000)", freq);
        }
        let amp = self.tone.amplitude;
        if !amp.is_finite() || !(0.0..=1.0).contains(&amp) {
            anyhow::bail!("tone.amplitude {} out of range (must be 0-1)", amp);
        }
        Ok(())
    }

    /// Apply command-line overrides and resolve paths
    pub fn resolve(mut self, overrides: &Overrides, paths: &AppPaths) -> Result<KeepAliveConfig> {
        if let Some(ms) = overrides.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        self.validate()?;

        let blocklist_path = overrides
            .blocklist
            .clone()
            .or(self.blocklist)
            .unwrap_or_else(|| paths.blocklist.clone());
        let logs_dir = overrides
            .logs_dir
            .clone()
            .or(self.logs_dir)
            .unwrap_or_else(|| paths.logs_dir.clone());

        Ok(KeepAliveConfig {
            log_mode: LogMode::from_flags(overrides.console, overrides.verbose),
            blocklist_path,
            logs_dir,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            watch_blocklist: overrides.watch_blocklist || self.watch_blocklist,
            tone: self.tone,
        })
    }
}

// Default value functions
fn default_poll_interval() -> u64 { 200 }
fn default_call_timeout() -> u64 { 1000 }

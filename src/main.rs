//! Audio KeepAlive
//!
//! Loops an inaudible tone on the default audio output device so it never
//! idles, pausing on block-listed devices.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use audio_keepalive::blocklist::{BlockList, BlockListWatcher};
use audio_keepalive::config::{AppConfig, KeepAliveConfig, Overrides};
use audio_keepalive::device::{self, CpalDeviceNames, DeviceWatcher};
use audio_keepalive::logging::init_logging;
use audio_keepalive::paths::AppPaths;
use audio_keepalive::playback::CpalSoundSource;
use audio_keepalive::reconcile::{self, Reconciler};

/// Audio KeepAlive - keep the default audio device awake
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Echo log lines to the console
    #[arg(short, long)]
    console: bool,

    /// Write log lines to a file in the logs directory
    #[arg(short, long)]
    verbose: bool,

    /// Path to the settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the blocked device list
    #[arg(long)]
    blocklist: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Device poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Reload the blocked device list when the file changes
    #[arg(long)]
    watch_blocklist: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            console: self.console,
            verbose: self.verbose,
            blocklist: self.blocklist.clone(),
            logs_dir: self.logs_dir.clone(),
            poll_interval_ms: self.poll_interval_ms,
            watch_blocklist: self.watch_blocklist,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let settings = AppConfig::load_or_default(&config_path).await?;
    let config = settings.resolve(&args.overrides(), &paths)?;

    if args.list_devices {
        return list_devices(&config);
    }

    let _log_guard = init_logging(config.log_mode, &config.logs_dir, &args.log_level)?;

    info!("KeepAlive started.");
    info!("Blocked device list: {}", config.blocklist_path.display());

    let result = run_app(config).await;

    info!("KeepAlive stopped.");
    result
}

async fn run_app(config: KeepAliveConfig) -> Result<()> {
    let block_list = BlockList::load(&config.blocklist_path);

    let block_list_watcher = if config.watch_blocklist {
        match BlockListWatcher::new(config.blocklist_path.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Blocked device list will not be reloaded: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let watcher = DeviceWatcher::new(Arc::new(CpalDeviceNames), config.call_timeout);
    let source = CpalSoundSource::spawn(config.tone, config.call_timeout, watcher.handle())
        .context("Failed to start audio worker")?;

    let mut reconciler = Reconciler::new(source, block_list);

    reconcile::run(
        &mut reconciler,
        &watcher,
        block_list_watcher,
        config.poll_interval,
        shutdown_signal(),
    )
    .await
    .context("Initial playback attempt failed")?;

    // Playback is stopped; dropping the reconciler shuts the audio worker down
    drop(reconciler);
    Ok(())
}

fn list_devices(config: &KeepAliveConfig) -> Result<()> {
    let block_list = BlockList::load(&config.blocklist_path);
    let devices = device::list_output_devices().context("Failed to enumerate output devices")?;

    println!("\n{}", "=== Output Devices ===".bold().cyan());
    if devices.is_empty() {
        println!("  {}", "(none)".yellow());
    }
    for dev in &devices {
        let marker = if dev.is_default { "*".green() } else { " ".normal() };
        let status = match block_list.matching_entry(&dev.name) {
            Some(entry) => format!("blocked by \"{}\"", entry).red(),
            None => "keepalive".green(),
        };
        println!("  {} {} [{}]", marker, dev.name.bright_white(), status);
    }
    println!(
        "\n  {} entries in {}",
        block_list.len(),
        config.blocklist_path.display()
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

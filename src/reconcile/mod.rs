//! Reconciliation loop
//!
//! Brings playback back into agreement with the latest known default device
//! and the block-list. Runs on a single task: it alone owns the playback
//! state and the block-list snapshot. Device notifications only reach it
//! through the watcher's pending signal.

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::blocklist::{BlockList, BlockListWatcher};
use crate::device::watcher::PendingSignal;
use crate::device::{DeviceName, DeviceSignal, DeviceWatcher, Observation};
use crate::error::{DeviceError, PlaybackError};
use crate::playback::{PlaybackController, SoundSource};

/// Externally visible loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not started, or shut down
    Idle,
    /// No device has been resolved yet; nothing plays
    DeviceUnknown,
    /// Device known and keepalive running
    Playing,
    /// Device known but blocked, or the last start failed
    Stopped,
}

/// Result of the initial decision at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Playing,
    Blocked,
    DeviceUnknown,
    /// The very first playback attempt failed
    PlaybackFailed(PlaybackError),
}

/// The reconciliation state machine
pub struct Reconciler<S: SoundSource> {
    playback: PlaybackController<S>,
    block_list: BlockList,
    last_known: Option<DeviceName>,
    started: bool,
    resolution_failure_logged: bool,
}

impl<S: SoundSource> Reconciler<S> {
    pub fn new(source: S, block_list: BlockList) -> Self {
        Self {
            playback: PlaybackController::new(source),
            block_list,
            last_known: None,
            started: false,
            resolution_failure_logged: false,
        }
    }

    /// Resolve the initial device and apply the first decision
    pub fn startup(&mut self, observation: &Observation) -> StartupOutcome {
        self.started = true;

        let name = match &observation.name {
            Ok(name) => name,
            Err(e) => {
                self.resolution_failed(e);
                return StartupOutcome::DeviceUnknown;
            }
        };

        info!("Initial device -> {}", name);
        self.last_known = Some(name.clone());

        if self.block_list.is_blocked(name) {
            let _ = self.reconcile(false);
            return StartupOutcome::Blocked;
        }
        match self.reconcile(false) {
            Ok(()) => StartupOutcome::Playing,
            Err(e) => StartupOutcome::PlaybackFailed(e),
        }
    }

    /// Apply one watcher observation.
    ///
    /// Returns true once the observation has been fully processed, which is
    /// when its pending signal may be acknowledged.
    pub fn apply(&mut self, observation: &Observation) -> bool {
        let name = match &observation.name {
            Ok(name) => name,
            Err(e) => {
                self.resolution_failed(e);
                return false;
            }
        };
        self.resolution_failure_logged = false;

        let changed = self.last_known.as_deref() != Some(name.as_str());
        if !changed && observation.pending.is_none() {
            return true;
        }

        if let Some(signal) = &observation.pending {
            log_signal(signal);
        }

        if changed {
            match self.last_known.replace(name.clone()) {
                Some(previous) => info!("Device changed: {} -> {}", previous, name),
                None => info!("Device detected -> {}", name),
            }
            // A new device makes a start failure worth reporting again
            self.playback.reset_failure_log();
        }

        let _ = self.reconcile(true);
        true
    }

    /// Swap in a reloaded block-list and re-evaluate the current device
    pub fn replace_block_list(&mut self, block_list: BlockList) {
        info!("Blocked device list reloaded ({} entries)", block_list.len());
        self.block_list = block_list;

        if self.last_known.is_some() {
            self.playback.reset_failure_log();
            let _ = self.reconcile(false);
        }
    }

    /// Stop playback before the process releases its audio handles
    pub fn shutdown(&mut self) {
        self.playback.stop();
        self.started = false;
    }

    pub fn state(&self) -> LoopState {
        if !self.started {
            LoopState::Idle
        } else if self.last_known.is_none() {
            LoopState::DeviceUnknown
        } else if self.playback.is_playing() {
            LoopState::Playing
        } else {
            LoopState::Stopped
        }
    }

    pub fn last_known_device(&self) -> Option<&str> {
        self.last_known.as_deref()
    }

    pub fn block_list(&self) -> &BlockList {
        &self.block_list
    }

    pub fn playback(&self) -> &PlaybackController<S> {
        &self.playback
    }

    /// Decide block status for the last known device and command playback.
    ///
    /// `device_event` re-attaches already running playback to the new device.
    fn reconcile(&mut self, device_event: bool) -> Result<(), PlaybackError> {
        let Some(name) = self.last_known.as_deref() else {
            self.playback.stop();
            return Ok(());
        };

        if let Some(entry) = self.block_list.matching_entry(name) {
            info!(
                "Device {} is blocked (matches \"{}\"), playback suspended.",
                name, entry
            );
            self.playback.stop();
            Ok(())
        } else if self.playback.is_playing() {
            if device_event {
                self.playback.follow_device()
            } else {
                Ok(())
            }
        } else {
            self.playback.start()
        }
    }

    /// A failed lookup says nothing about the device, so the last known name
    /// and playback are left as they are. Only the first failure in a row is
    /// logged.
    fn resolution_failed(&mut self, e: &DeviceError) {
        if !self.resolution_failure_logged {
            warn!("Unable to resolve default audio device: {}", e);
            self.resolution_failure_logged = true;
        }
    }
}

fn log_signal(signal: &PendingSignal) {
    match signal.kind {
        DeviceSignal::Removed => info!("Audio device removed."),
        DeviceSignal::StateChanged => info!("Audio device state changed."),
        DeviceSignal::DefaultChanged => debug!("Default device change notified"),
    }
}

/// Drive the reconciler until `shutdown` completes.
///
/// Resolves the initial device, then polls the watcher every
/// `poll_interval`. Reloaded block-lists are applied as they arrive. If the
/// very first playback attempt fails the loop does not start and the error
/// is returned.
pub async fn run<S: SoundSource>(
    reconciler: &mut Reconciler<S>,
    watcher: &DeviceWatcher,
    mut block_lists: Option<BlockListWatcher>,
    poll_interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<(), PlaybackError> {
    let first = watcher.observe().await;
    match reconciler.startup(&first) {
        StartupOutcome::PlaybackFailed(e) => {
            reconciler.shutdown();
            return Err(e);
        }
        outcome => debug!("Startup outcome: {:?}", outcome),
    }
    if let Some(signal) = &first.pending {
        if first.name.is_ok() {
            watcher.acknowledge(signal);
        }
    }

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; startup already covered it
    ticker.tick().await;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let observation = watcher.observe().await;
                if reconciler.apply(&observation) {
                    if let Some(signal) = &observation.pending {
                        watcher.acknowledge(signal);
                    }
                }
            }

            Some(list) = next_block_list(&mut block_lists) => {
                reconciler.replace_block_list(list);
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping playback");
                break;
            }
        }
    }

    reconciler.shutdown();
    Ok(())
}

async fn next_block_list(watcher: &mut Option<BlockListWatcher>) -> Option<BlockList> {
    match watcher {
        Some(watcher) => watcher.next_list().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests;

//! Default device watcher
//!
//! Two sources feed change detection:
//! - polling: [`DeviceWatcher::observe`] resolves the current name every tick;
//! - notifications: platform callbacks (or the audio stream's error callback)
//!   raise signals through a [`WatcherHandle`].
//!
//! Callbacks only touch [`WatcherState`] under a short lock. The pending
//! signal is acknowledged by sequence number once the reconciliation loop has
//! applied it, so a signal raised while a tick is in progress survives.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{DeviceName, DeviceNameProvider};
use crate::error::DeviceError;

/// Kind of device notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSignal {
    /// The default render device changed
    DefaultChanged,
    /// A render device was removed
    Removed,
    /// A render device changed state (disabled, unplugged, invalidated)
    StateChanged,
}

/// Signal not yet acknowledged by the reconciliation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignal {
    /// Most recent signal kind
    pub kind: DeviceSignal,
    /// Name recorded by a default-changed callback, if any
    pub reported_name: Option<DeviceName>,
    seq: u64,
}

/// State shared between notification callbacks and the loop
#[derive(Debug, Default)]
struct WatcherState {
    last_reported_name: Option<DeviceName>,
    last_kind: Option<DeviceSignal>,
    signal_seq: u64,
    acked_seq: u64,
}

/// Cheap, cloneable entry point for notification callbacks.
///
/// Safe to call from any thread; never touches playback.
#[derive(Debug, Clone, Default)]
pub struct WatcherHandle {
    state: Arc<Mutex<WatcherState>>,
}

impl WatcherHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default render device changed; `name` is the new device when the
    /// callback could resolve it.
    ///
    /// Entry point for a platform default-device notifier. cpal exposes no
    /// such callback, so the shipped binary only raises removal and state
    /// signals from the stream error callback; a notifier registered by an
    /// embedding application calls this one.
    pub fn default_device_changed(&self, name: Option<DeviceName>) {
        self.raise(DeviceSignal::DefaultChanged, name);
    }

    pub fn device_removed(&self) {
        self.raise(DeviceSignal::Removed, None);
    }

    pub fn device_state_changed(&self) {
        self.raise(DeviceSignal::StateChanged, None);
    }

    fn raise(&self, kind: DeviceSignal, name: Option<DeviceName>) {
        let mut state = self.state.lock();
        state.signal_seq += 1;
        state.last_kind = Some(kind);
        if name.is_some() {
            state.last_reported_name = name;
        }
        debug!("Device signal raised: {:?} (seq {})", kind, state.signal_seq);
    }

    /// Snapshot of the pending signal, if any
    pub fn pending(&self) -> Option<PendingSignal> {
        let state = self.state.lock();
        if state.signal_seq == state.acked_seq {
            return None;
        }
        state.last_kind.map(|kind| PendingSignal {
            kind,
            reported_name: state.last_reported_name.clone(),
            seq: state.signal_seq,
        })
    }

    /// Clear the pending flag up to and including `signal`.
    ///
    /// Signals raised after the snapshot was taken stay pending.
    pub fn acknowledge(&self, signal: &PendingSignal) {
        let mut state = self.state.lock();
        if signal.seq > state.acked_seq {
            state.acked_seq = signal.seq;
        }
        if state.acked_seq == state.signal_seq {
            state.last_reported_name = None;
        }
    }
}

/// Result of one watcher tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Current default device name, or why it is unknown
    pub name: Result<DeviceName, DeviceError>,
    /// Notification waiting to be applied
    pub pending: Option<PendingSignal>,
}

impl Observation {
    /// A plain polled name with no pending notification
    pub fn polled(name: impl Into<DeviceName>) -> Self {
        Self {
            name: Ok(name.into()),
            pending: None,
        }
    }

    /// A failed resolution with no pending notification
    pub fn unavailable(error: DeviceError) -> Self {
        Self {
            name: Err(error),
            pending: None,
        }
    }
}

/// Resolves the current default device with a bounded platform call
pub struct DeviceWatcher {
    provider: Arc<dyn DeviceNameProvider>,
    handle: WatcherHandle,
    call_timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

impl DeviceWatcher {
    pub fn new(provider: Arc<dyn DeviceNameProvider>, call_timeout: Duration) -> Self {
        Self {
            provider,
            handle: WatcherHandle::new(),
            call_timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to hand to notification sources
    pub fn handle(&self) -> WatcherHandle {
        self.handle.clone()
    }

    /// Resolve the current default device name and collect pending signals.
    ///
    /// The provider runs on the blocking pool and is abandoned after
    /// `call_timeout`. While an abandoned call is still stuck, later ticks
    /// report a timeout instead of piling up more blocked threads.
    pub async fn observe(&self) -> Observation {
        let pending = self.handle.pending();

        let name = match self.resolve().await {
            Ok(name) => Ok(name),
            Err(e) => match pending.as_ref().and_then(|p| p.reported_name.clone()) {
                Some(reported) => {
                    debug!("Resolution failed ({}), using callback-reported name", e);
                    Ok(reported)
                }
                None => Err(e),
            },
        };

        Observation { name, pending }
    }

    /// Acknowledge a signal once its effect has been applied
    pub fn acknowledge(&self, signal: &PendingSignal) {
        self.handle.acknowledge(signal);
    }

    async fn resolve(&self) -> Result<DeviceName, DeviceError> {
        let timeout_ms = self.call_timeout.as_millis() as u64;

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DeviceError::Timeout(timeout_ms));
        }

        let provider = Arc::clone(&self.provider);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            provider.current_device_name()
        });

        match tokio::time::timeout(self.call_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DeviceError::HostUnavailable(join_err.to_string())),
            Err(_) => Err(DeviceError::Timeout(timeout_ms)),
        }
    }
}

/// Clears the in-flight flag when the provider call ends, panics included
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

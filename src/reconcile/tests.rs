//! Tests for the reconciliation loop

use super::*;
use crate::device::{DeviceNameProvider, WatcherHandle};
use crate::playback::testing::{Effect, RecordingSource};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

fn bluetooth_blocked() -> BlockList {
    ["Bluetooth"].into_iter().collect()
}

fn reconciler(block_list: BlockList) -> Reconciler<RecordingSource> {
    Reconciler::new(RecordingSource::default(), block_list)
}

fn effects(r: &Reconciler<RecordingSource>) -> &[Effect] {
    &r.playback().source().effects
}

fn signalled(name: &str, kind: DeviceSignal) -> Observation {
    let handle = WatcherHandle::new();
    match kind {
        DeviceSignal::DefaultChanged => handle.default_device_changed(Some(name.to_string())),
        DeviceSignal::Removed => handle.device_removed(),
        DeviceSignal::StateChanged => handle.device_state_changed(),
    }
    Observation {
        name: Ok(name.to_string()),
        pending: handle.pending(),
    }
}

/// Device name provider whose answer the test can change at any time
#[derive(Clone)]
struct ScriptedDeviceNames {
    current: Arc<Mutex<Result<DeviceName, DeviceError>>>,
}

impl ScriptedDeviceNames {
    fn new(name: &str) -> Self {
        Self {
            current: Arc::new(Mutex::new(Ok(name.to_string()))),
        }
    }

    fn set(&self, name: &str) {
        *self.current.lock() = Ok(name.to_string());
    }
}

impl DeviceNameProvider for ScriptedDeviceNames {
    fn current_device_name(&self) -> Result<DeviceName, DeviceError> {
        self.current.lock().clone()
    }
}

#[test]
fn test_new_reconciler_is_idle() {
    let r = reconciler(BlockList::empty());
    assert_eq!(r.state(), LoopState::Idle);
    assert!(effects(&r).is_empty());
}

#[test]
fn test_startup_unblocked_starts() {
    let mut r = reconciler(bluetooth_blocked());

    let outcome = r.startup(&Observation::polled("Speakers"));

    assert_eq!(outcome, StartupOutcome::Playing);
    assert_eq!(r.state(), LoopState::Playing);
    assert_eq!(effects(&r), [Effect::Start]);
}

#[test]
fn test_startup_blocked_never_starts() {
    let mut r = reconciler(bluetooth_blocked());

    let outcome = r.startup(&Observation::polled("My Bluetooth Headset"));

    assert_eq!(outcome, StartupOutcome::Blocked);
    assert_eq!(r.state(), LoopState::Stopped);
    assert!(effects(&r).is_empty());
}

#[test]
fn test_startup_playback_failure_is_reported() {
    let mut r = Reconciler::new(RecordingSource::failing_starts(1), BlockList::empty());

    let outcome = r.startup(&Observation::polled("Speakers"));

    assert_eq!(outcome, StartupOutcome::PlaybackFailed(PlaybackError::NoDevice));
    assert_eq!(r.state(), LoopState::Stopped);
}

#[test]
fn test_unblocked_blocked_unblocked_sequence() {
    let block_list: BlockList = ["Blocked"].into_iter().collect();
    let mut r = reconciler(block_list);

    r.startup(&Observation::polled("Device A"));
    assert!(r.apply(&Observation::polled("Blocked Device B")));
    assert_eq!(r.state(), LoopState::Stopped);
    assert!(r.apply(&Observation::polled("Device C")));

    assert_eq!(effects(&r), [Effect::Start, Effect::Stop, Effect::Start]);
    assert_eq!(r.state(), LoopState::Playing);
    assert_eq!(r.last_known_device(), Some("Device C"));
}

#[test]
fn test_bluetooth_headset_scenario() {
    let mut r = reconciler(bluetooth_blocked());

    r.startup(&Observation::polled("Speakers"));
    r.apply(&Observation::polled("My Bluetooth Headset"));
    r.apply(&Observation::polled("Speakers"));

    assert_eq!(effects(&r), [Effect::Start, Effect::Stop, Effect::Start]);
}

#[test]
fn test_same_name_has_no_effect() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::polled("Speakers"));
    for _ in 0..5 {
        assert!(r.apply(&Observation::polled("Speakers")));
    }

    assert_eq!(effects(&r), [Effect::Start]);
}

#[test]
fn test_switch_between_unblocked_devices_follows() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::polled("Speakers"));
    r.apply(&Observation::polled("USB Headset"));

    assert_eq!(effects(&r), [Effect::Start, Effect::Follow]);
    assert_eq!(r.state(), LoopState::Playing);
}

#[test]
fn test_resolution_failure_at_startup_then_recovery() {
    let mut r = reconciler(BlockList::empty());

    let outcome = r.startup(&Observation::unavailable(DeviceError::NoDefaultDevice));
    assert_eq!(outcome, StartupOutcome::DeviceUnknown);
    assert_eq!(r.state(), LoopState::DeviceUnknown);

    // Still failing on later ticks: nothing happens, failure logged once
    assert!(!r.apply(&Observation::unavailable(DeviceError::NoDefaultDevice)));
    assert!(r.resolution_failure_logged);
    assert!(effects(&r).is_empty());

    assert!(r.apply(&Observation::polled("Speakers")));
    assert_eq!(r.state(), LoopState::Playing);
    assert_eq!(effects(&r), [Effect::Start]);
    assert!(!r.resolution_failure_logged);
}

#[test]
fn test_transient_resolution_failure_keeps_playing() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::polled("Speakers"));
    assert!(!r.apply(&Observation::unavailable(DeviceError::Timeout(1000))));
    assert!(!r.apply(&Observation::unavailable(DeviceError::Timeout(1000))));
    assert_eq!(r.state(), LoopState::Playing);
    assert_eq!(r.last_known_device(), Some("Speakers"));

    // Same device again once resolution recovers: nothing to do
    assert!(r.apply(&Observation::polled("Speakers")));

    assert_eq!(effects(&r), [Effect::Start]);
    assert!(!r.resolution_failure_logged);
}

#[test]
fn test_resolution_failure_then_new_device_acts_once() {
    let mut r = reconciler(bluetooth_blocked());

    r.startup(&Observation::polled("Speakers"));
    r.apply(&Observation::unavailable(DeviceError::NoDefaultDevice));
    r.apply(&Observation::polled("My Bluetooth Headset"));
    r.apply(&Observation::polled("My Bluetooth Headset"));

    assert_eq!(effects(&r), [Effect::Start, Effect::Stop]);
    assert_eq!(r.state(), LoopState::Stopped);
}

#[test]
fn test_failed_start_retries_only_on_next_change() {
    let mut r = Reconciler::new(RecordingSource::failing_starts(2), BlockList::empty());

    r.startup(&Observation::unavailable(DeviceError::NoDefaultDevice));
    r.apply(&Observation::polled("Speakers"));
    assert_eq!(r.state(), LoopState::Stopped);

    // Same device polled again: no retry
    r.apply(&Observation::polled("Speakers"));
    assert_eq!(effects(&r), [Effect::Start]);

    // Next change retries (and fails once more)
    r.apply(&Observation::polled("Headphones"));
    assert_eq!(r.state(), LoopState::Stopped);

    // Next change after that succeeds
    r.apply(&Observation::polled("Speakers"));
    assert_eq!(r.state(), LoopState::Playing);
    assert_eq!(effects(&r), [Effect::Start, Effect::Start, Effect::Start]);
}

#[test]
fn test_removal_signal_with_same_name_refollows() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::polled("Speakers"));
    assert!(r.apply(&signalled("Speakers", DeviceSignal::Removed)));

    assert_eq!(effects(&r), [Effect::Start, Effect::Follow]);
    assert_eq!(r.state(), LoopState::Playing);
}

#[test]
fn test_state_change_signal_retries_failed_start() {
    let mut r = Reconciler::new(RecordingSource::failing_starts(1), BlockList::empty());

    r.startup(&Observation::polled("Speakers"));
    assert_eq!(r.state(), LoopState::Stopped);

    r.apply(&signalled("Speakers", DeviceSignal::StateChanged));

    assert_eq!(r.state(), LoopState::Playing);
    assert_eq!(effects(&r), [Effect::Start, Effect::Start]);
}

#[test]
fn test_signal_for_blocked_device_does_not_start() {
    let mut r = reconciler(bluetooth_blocked());

    r.startup(&Observation::polled("Bluetooth Speaker"));
    r.apply(&signalled("Bluetooth Speaker", DeviceSignal::DefaultChanged));

    assert!(effects(&r).is_empty());
    assert_eq!(r.state(), LoopState::Stopped);
}

#[test]
fn test_block_list_reload_reevaluates_current_device() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::polled("My Bluetooth Headset"));
    r.replace_block_list(bluetooth_blocked());
    assert_eq!(r.state(), LoopState::Stopped);

    r.replace_block_list(BlockList::empty());
    assert_eq!(r.state(), LoopState::Playing);

    // Reload that changes nothing for the device: no effect
    r.replace_block_list(BlockList::parse("HDMI"));

    assert_eq!(effects(&r), [Effect::Start, Effect::Stop, Effect::Start]);
}

#[test]
fn test_block_list_reload_without_device_does_nothing() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::unavailable(DeviceError::NoDefaultDevice));
    r.replace_block_list(bluetooth_blocked());

    assert!(effects(&r).is_empty());
    assert_eq!(r.block_list().len(), 1);
}

#[test]
fn test_shutdown_stops_playback() {
    let mut r = reconciler(BlockList::empty());

    r.startup(&Observation::polled("Speakers"));
    r.shutdown();

    assert_eq!(effects(&r), [Effect::Start, Effect::Stop]);
    assert_eq!(r.state(), LoopState::Idle);
}

#[tokio::test]
async fn test_run_follows_device_changes_and_stops_on_shutdown() {
    let names = ScriptedDeviceNames::new("Speakers");
    let watcher = DeviceWatcher::new(Arc::new(names.clone()), Duration::from_millis(500));
    let handle = watcher.handle();
    let mut r = reconciler(bluetooth_blocked());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let shutdown = async {
        let _ = shutdown_rx.await;
    };
    let driver = async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        names.set("My Bluetooth Headset");
        tokio::time::sleep(Duration::from_millis(80)).await;
        names.set("Speakers");
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.device_removed();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = shutdown_tx.send(());
    };

    let (result, ()) = tokio::join!(
        run(&mut r, &watcher, None, Duration::from_millis(10), shutdown),
        driver
    );

    assert!(result.is_ok());
    assert_eq!(
        effects(&r),
        [
            Effect::Start,
            Effect::Stop,
            Effect::Start,
            Effect::Follow,
            Effect::Stop
        ]
    );
    assert_eq!(r.state(), LoopState::Idle);
    assert!(handle.pending().is_none());
}

#[tokio::test]
async fn test_run_fails_when_first_playback_fails() {
    let watcher = DeviceWatcher::new(
        Arc::new(ScriptedDeviceNames::new("Speakers")),
        Duration::from_millis(500),
    );
    let mut r = Reconciler::new(RecordingSource::failing_starts(1), BlockList::empty());

    let result = run(
        &mut r,
        &watcher,
        None,
        Duration::from_millis(10),
        std::future::pending(),
    )
    .await;

    assert_eq!(result, Err(PlaybackError::NoDevice));
    assert_eq!(r.state(), LoopState::Idle);
}

#[tokio::test]
async fn test_run_keeps_going_when_device_unknown_at_startup() {
    let names = ScriptedDeviceNames::new("Speakers");
    *names.current.lock() = Err(DeviceError::NoDefaultDevice);
    let watcher = DeviceWatcher::new(Arc::new(names.clone()), Duration::from_millis(500));
    let mut r = reconciler(BlockList::empty());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let driver = async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        names.set("Speakers");
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = shutdown_tx.send(());
    };
    let shutdown = async {
        let _ = shutdown_rx.await;
    };

    let (result, ()) = tokio::join!(
        run(&mut r, &watcher, None, Duration::from_millis(10), shutdown),
        driver
    );

    assert!(result.is_ok());
    assert_eq!(effects(&r), [Effect::Start, Effect::Stop]);
}

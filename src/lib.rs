//! Audio KeepAlive
//!
//! Keeps the default audio output device from dropping into power-saving idle
//! by looping an inaudible tone on it, except on devices whose name matches
//! the block-list.
//!
//! The pieces, leaf to root:
//! - [`blocklist`]: which device names are excluded;
//! - [`device`]: current default device name and change signals;
//! - [`playback`]: idempotent start/stop of the keepalive tone;
//! - [`reconcile`]: the loop keeping playback in step with the device.

pub mod blocklist;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod paths;
pub mod playback;
pub mod reconcile;

pub use blocklist::BlockList;
pub use config::{AppConfig, KeepAliveConfig};
pub use device::{CpalDeviceNames, DeviceName, DeviceNameProvider, DeviceWatcher};
pub use error::{DeviceError, PlaybackError};
pub use playback::{CpalSoundSource, PlaybackController, SoundSource};
pub use reconcile::{LoopState, Reconciler};

//! Default render device resolution
//!
//! The keepalive only needs the display name of the current default output
//! device. Names are not stable identifiers: two endpoints may share one, and
//! a name change is what counts as a device change.

pub mod watcher;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;

pub use watcher::{DeviceSignal, DeviceWatcher, Observation, WatcherHandle};

/// Display name of an audio render endpoint
pub type DeviceName = String;

/// Supplier of the current default render device name
///
/// Implementations may block on the platform audio subsystem; callers bound
/// the call (see [`DeviceWatcher`]).
pub trait DeviceNameProvider: Send + Sync + 'static {
    fn current_device_name(&self) -> Result<DeviceName, DeviceError>;
}

impl<F> DeviceNameProvider for F
where
    F: Fn() -> Result<DeviceName, DeviceError> + Send + Sync + 'static,
{
    fn current_device_name(&self) -> Result<DeviceName, DeviceError> {
        self()
    }
}

/// Resolves names through the platform's default cpal host.
///
/// Every call opens the host and device afresh and drops them before
/// returning, so no platform handle outlives the lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceNames;

impl DeviceNameProvider for CpalDeviceNames {
    fn current_device_name(&self) -> Result<DeviceName, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoDefaultDevice)?;
        Ok(device.name()?)
    }
}

/// An output device as listed by `--list-devices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: DeviceName,
    pub is_default: bool,
}

/// Enumerate all output devices of the default host, default first
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::HostUnavailable(e.to_string()))?;

    let mut list: Vec<OutputDeviceInfo> = devices
        .filter_map(|d| d.name().ok())
        .map(|name| OutputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();

    list.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    Ok(list)
}

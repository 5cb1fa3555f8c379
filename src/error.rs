//! Error types for device resolution and playback

use thiserror::Error;

/// Errors raised while resolving the default render device
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The audio host could not be opened
    #[error("audio host unavailable: {0}")]
    HostUnavailable(String),

    /// The host reports no default output device
    #[error("no default output device")]
    NoDefaultDevice,

    /// The device exists but its display name could not be read
    #[error("device name unavailable: {0}")]
    NameUnavailable(String),

    /// The platform call did not return within the configured bound
    #[error("device resolution timed out after {0} ms")]
    Timeout(u64),
}

/// Errors raised by a sound source
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// No output device to play on
    #[error("no output device available")]
    NoDevice,

    /// The device's default sample format is not supported
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The device configuration could not be queried
    #[error("device configuration error: {0}")]
    Config(String),

    /// Building the output stream failed
    #[error("failed to build output stream: {0}")]
    StreamBuild(String),

    /// The stream was built but refused to play
    #[error("failed to play stream: {0}")]
    StreamPlay(String),

    /// The audio worker thread is gone
    #[error("audio worker unavailable")]
    WorkerUnavailable,

    /// The audio worker did not answer in time
    #[error("audio worker did not respond within {0} ms")]
    Timeout(u64),
}

impl From<cpal::BuildStreamError> for PlaybackError {
    fn from(err: cpal::BuildStreamError) -> Self {
        PlaybackError::StreamBuild(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for PlaybackError {
    fn from(err: cpal::PlayStreamError) -> Self {
        PlaybackError::StreamPlay(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for PlaybackError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        PlaybackError::Config(err.to_string())
    }
}

impl From<cpal::DeviceNameError> for DeviceError {
    fn from(err: cpal::DeviceNameError) -> Self {
        DeviceError::NameUnavailable(err.to_string())
    }
}

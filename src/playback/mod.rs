//! Keepalive playback
//!
//! [`PlaybackController`] keeps a single `is_playing` flag in step with what
//! the [`SoundSource`] was last told to do. Start and stop are idempotent, and
//! repeated start failures are logged once until the situation changes.

pub mod cpal_source;
pub mod tone;

use tracing::{error, info};

use crate::error::PlaybackError;

pub use cpal_source::CpalSoundSource;
pub use tone::{Tone, ToneOscillator};

/// Supplier of the looping keepalive sound
pub trait SoundSource {
    /// Begin indefinite, looping, non-blocking playback
    fn start_loop(&mut self) -> Result<(), PlaybackError>;

    /// Stop all playback. Best-effort; never fails.
    fn stop_all(&mut self);

    /// Move running playback onto the current default device.
    ///
    /// Sources that always play on the default device need not override it.
    fn follow_default_device(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }
}

impl<S: SoundSource + ?Sized> SoundSource for Box<S> {
    fn start_loop(&mut self) -> Result<(), PlaybackError> {
        (**self).start_loop()
    }

    fn stop_all(&mut self) {
        (**self).stop_all()
    }

    fn follow_default_device(&mut self) -> Result<(), PlaybackError> {
        (**self).follow_default_device()
    }
}

/// Idempotent start/stop on top of a [`SoundSource`]
pub struct PlaybackController<S: SoundSource> {
    source: S,
    is_playing: bool,
    failure_logged: bool,
}

impl<S: SoundSource> PlaybackController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            is_playing: false,
            failure_logged: false,
        }
    }

    /// Start looping playback unless it is already running.
    ///
    /// On failure `is_playing` stays false and the error is logged, at most
    /// once until [`reset_failure_log`](Self::reset_failure_log) is called.
    pub fn start(&mut self) -> Result<(), PlaybackError> {
        if self.is_playing {
            return Ok(());
        }

        match self.source.start_loop() {
            Ok(()) => {
                self.is_playing = true;
                self.failure_logged = false;
                info!("Playback started.");
                Ok(())
            }
            Err(e) => {
                self.log_failure(&e);
                Err(e)
            }
        }
    }

    /// Stop playback if it is running
    pub fn stop(&mut self) {
        if !self.is_playing {
            return;
        }
        self.source.stop_all();
        self.is_playing = false;
        info!("Playback stopped.");
    }

    /// Re-attach running playback to the current default device.
    ///
    /// A failure leaves playback stopped; the next device change retries.
    pub fn follow_device(&mut self) -> Result<(), PlaybackError> {
        if !self.is_playing {
            return Ok(());
        }

        match self.source.follow_default_device() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.source.stop_all();
                self.is_playing = false;
                self.log_failure(&e);
                Err(e)
            }
        }
    }

    /// Allow the next start failure to be logged again
    pub fn reset_failure_log(&mut self) {
        self.failure_logged = false;
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn log_failure(&mut self, e: &PlaybackError) {
        if !self.failure_logged {
            error!("Playback failed: {}", e);
            self.failure_logged = true;
        }
    }
}

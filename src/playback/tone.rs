//! Inaudible keepalive tone

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Keepalive tone parameters.
///
/// The default is a 20 Hz sine far below audibility at typical volume. An
/// amplitude of zero renders digital silence.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Tone {
    #[serde(default = "default_frequency")]
    pub frequency_hz: f32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency(),
            amplitude: default_amplitude(),
        }
    }
}

fn default_frequency() -> f32 { 20.0 }
fn default_amplitude() -> f32 { 0.0005 }

/// Phase-continuous sine generator writing interleaved frames.
///
/// Runs inside the audio callback, so it never allocates.
#[derive(Debug, Clone)]
pub struct ToneOscillator {
    phase: f32,
    step: f32,
    amplitude: f32,
    channels: usize,
}

impl ToneOscillator {
    pub fn new(tone: Tone, sample_rate: u32, channels: u16) -> Self {
        let step = if sample_rate == 0 {
            0.0
        } else {
            tone.frequency_hz / sample_rate as f32
        };
        Self {
            phase: 0.0,
            step,
            amplitude: tone.amplitude.clamp(0.0, 1.0),
            channels: usize::from(channels.max(1)),
        }
    }

    /// Next mono sample value in `-amplitude..=amplitude`
    pub fn next_value(&mut self) -> f32 {
        let value = (self.phase * TAU).sin() * self.amplitude;
        self.phase = (self.phase + self.step).fract();
        value
    }

    /// Fill an interleaved buffer, same value on every channel of a frame
    pub fn fill<T: cpal::SizedSample + cpal::FromSample<f32>>(&mut self, data: &mut [T]) {
        for frame in data.chunks_mut(self.channels) {
            let sample = T::from_sample(self.next_value());
            for slot in frame.iter_mut() {
                *slot = sample;
            }
        }
    }
}

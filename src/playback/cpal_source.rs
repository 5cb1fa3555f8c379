//! cpal-backed keepalive sound source
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated audio
//! worker thread. The controller talks to it over a command channel and waits
//! for each reply with a bounded timeout: a wedged audio subsystem costs one
//! failed command, not a stuck reconciliation loop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig, StreamError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use super::tone::{Tone, ToneOscillator};
use super::SoundSource;
use crate::device::WatcherHandle;
use crate::error::PlaybackError;

type Reply<T> = Sender<T>;

/// Commands sent to the audio worker thread
enum WorkerCommand {
    /// Open a stream on the default device and play
    Start(Reply<Result<(), PlaybackError>>),
    /// Re-open the running stream on the current default device
    Follow(Reply<Result<(), PlaybackError>>),
    /// Drop the running stream
    Stop(Reply<()>),
    /// Drop everything and exit
    Shutdown,
}

/// Looping tone on the default output device
pub struct CpalSoundSource {
    cmd_tx: Sender<WorkerCommand>,
    done_rx: Receiver<()>,
    worker: Option<JoinHandle<()>>,
    call_timeout: Duration,
}

impl CpalSoundSource {
    /// Spawn the audio worker.
    ///
    /// `signals` receives a device notification whenever the running stream
    /// reports that its device went away.
    pub fn spawn(
        tone: Tone,
        call_timeout: Duration,
        signals: WatcherHandle,
    ) -> Result<Self, PlaybackError> {
        Self::spawn_with(call_timeout, move || open_stream(tone, &signals))
    }

    /// Spawn the worker around any stream opener.
    ///
    /// The opener runs on the worker thread, so the stream it returns never
    /// has to be `Send`. Dropping the stream stops it.
    fn spawn_with<H, F>(call_timeout: Duration, open: F) -> Result<Self, PlaybackError>
    where
        H: 'static,
        F: FnMut() -> Result<H, PlaybackError> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = channel::bounded(8);
        let (done_tx, done_rx) = channel::bounded::<()>(1);

        let worker = std::thread::Builder::new()
            .name("keepalive-audio".to_string())
            .spawn(move || {
                run_worker(cmd_rx, open);
                drop(done_tx);
            })
            .map_err(|_| PlaybackError::WorkerUnavailable)?;

        Ok(Self {
            cmd_tx,
            done_rx,
            worker: Some(worker),
            call_timeout,
        })
    }

    /// Send one command and wait for its reply, both within `call_timeout`
    fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> WorkerCommand,
    ) -> Result<T, PlaybackError> {
        let timeout = PlaybackError::Timeout(self.call_timeout.as_millis() as u64);
        let deadline = Instant::now() + self.call_timeout;
        let (reply_tx, reply_rx) = channel::bounded(1);

        blocking(|| {
            self.cmd_tx
                .send_deadline(make(reply_tx), deadline)
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => timeout.clone(),
                    SendTimeoutError::Disconnected(_) => PlaybackError::WorkerUnavailable,
                })?;

            reply_rx.recv_deadline(deadline).map_err(|e| match e {
                RecvTimeoutError::Timeout => timeout.clone(),
                RecvTimeoutError::Disconnected => PlaybackError::WorkerUnavailable,
            })
        })
    }

    /// Start or follow; a stream opened after the caller gave up is dropped
    fn open_command(
        &mut self,
        make: fn(Reply<Result<(), PlaybackError>>) -> WorkerCommand,
    ) -> Result<(), PlaybackError> {
        let result = self.request(make).and_then(|reply| reply);
        if let Err(PlaybackError::Timeout(_)) = result {
            self.discard_late_stream();
        }
        result
    }

    /// Queue a stop behind the abandoned command without waiting for it
    fn discard_late_stream(&self) {
        let (reply_tx, _) = channel::bounded(1);
        if self.cmd_tx.try_send(WorkerCommand::Stop(reply_tx)).is_err() {
            warn!("Audio worker is backed up, could not queue stop");
        }
    }
}

impl SoundSource for CpalSoundSource {
    fn start_loop(&mut self) -> Result<(), PlaybackError> {
        self.open_command(WorkerCommand::Start)
    }

    fn stop_all(&mut self) {
        if let Err(e) = self.request(WorkerCommand::Stop) {
            warn!("Audio worker did not confirm stop: {}", e);
        }
    }

    fn follow_default_device(&mut self) -> Result<(), PlaybackError> {
        self.open_command(WorkerCommand::Follow)
    }
}

impl Drop for CpalSoundSource {
    fn drop(&mut self) {
        let call_timeout = self.call_timeout;
        let cmd_tx = &self.cmd_tx;
        let done_rx = &self.done_rx;
        let worker = &mut self.worker;

        blocking(|| {
            let _ = cmd_tx.send_timeout(WorkerCommand::Shutdown, call_timeout);

            // The worker drops `done_tx` on exit; only join once it has
            match done_rx.recv_timeout(call_timeout) {
                Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                    if let Some(worker) = worker.take() {
                        let _ = worker.join();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Audio worker did not exit in time, detaching");
                }
            }
        });
    }
}

/// Run a blocking wait without stalling a tokio worker thread.
///
/// Only the multi-threaded runtime can hand its worker over; elsewhere the
/// wait runs inline.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn run_worker<H, F>(cmd_rx: Receiver<WorkerCommand>, mut open: F)
where
    F: FnMut() -> Result<H, PlaybackError>,
{
    let mut stream: Option<H> = None;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            WorkerCommand::Start(reply) => {
                drop(stream.take());
                stream = open_and_reply(&mut open, reply);
            }
            WorkerCommand::Follow(reply) => match stream.take() {
                Some(old) => {
                    drop(old);
                    stream = open_and_reply(&mut open, reply);
                }
                None => {
                    let _ = reply.send(Ok(()));
                }
            },
            WorkerCommand::Stop(reply) => {
                drop(stream.take());
                let _ = reply.send(());
            }
            WorkerCommand::Shutdown => break,
        }
    }

    drop(stream);
    debug!("Audio worker exiting");
}

/// Open a stream and keep it only if the requester is still waiting
fn open_and_reply<H>(
    open: &mut impl FnMut() -> Result<H, PlaybackError>,
    reply: Reply<Result<(), PlaybackError>>,
) -> Option<H> {
    match open() {
        Ok(stream) => match reply.send(Ok(())) {
            Ok(()) => Some(stream),
            Err(_) => {
                debug!("Stream opened after the request timed out, dropping it");
                None
            }
        },
        Err(e) => {
            let _ = reply.send(Err(e));
            None
        }
    }
}

fn open_stream(tone: Tone, signals: &WatcherHandle) -> Result<Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;

    let supported = device.default_output_config()?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: StreamConfig = supported.config();
    let osc = ToneOscillator::new(tone, sample_rate, channels);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, osc, signals.clone())?,
        SampleFormat::F64 => build_stream::<f64>(&device, &config, osc, signals.clone())?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, osc, signals.clone())?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, osc, signals.clone())?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, osc, signals.clone())?,
        format => return Err(PlaybackError::UnsupportedFormat(format!("{:?}", format))),
    };

    stream.play()?;

    debug!(
        "Keepalive stream open: {} Hz, {} channels, {:?}",
        sample_rate,
        channels,
        supported.sample_format()
    );
    Ok(stream)
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut osc: ToneOscillator,
    signals: WatcherHandle,
) -> Result<Stream, PlaybackError> {
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| osc.fill(data),
        // Runs on the audio backend's thread: flag only, never start/stop here
        move |err| raise_stream_error(&signals, err),
        None,
    )?;
    Ok(stream)
}

fn raise_stream_error(signals: &WatcherHandle, err: StreamError) {
    match err {
        StreamError::DeviceNotAvailable => signals.device_removed(),
        other => {
            warn!("Audio stream error: {}", other);
            signals.device_state_changed();
        }
    }
}

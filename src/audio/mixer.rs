//! Dual-source audio mixing with per-source gain and level metering.
//!
//! The mixer owns both capture devices and a pump thread that drains them on
//! a fixed tick, routes each through its gain stage, updates the per-source
//! level meters and emits mixed frames into a bounded analysis channel.
//!
//! The mixed output is only ever connected to that analysis/transmit
//! channel, never to a playback path; routing the local microphone back to
//! the speakers would create a feedback loop. This is the central
//! correctness property of the mixer.

use crate::audio::level::LevelMeter;
use crate::audio::source::{CaptureConstraints, CaptureProvider, CaptureSource, SourceKind};
use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::error::Result;
use crate::report::{ErrorReporter, LogReporter, TaskError};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration for the audio mixer.
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Gain applied to the local source, clamped to [0, MAX_GAIN].
    pub local_gain: f32,
    /// Gain applied to the remote source, clamped to [0, MAX_GAIN].
    pub remote_gain: f32,
    /// Interval between pump ticks.
    pub mix_interval: Duration,
    /// Capacity of the mixed-frame output channel.
    pub frame_buffer: usize,
    /// Level-meter analysis window size in samples.
    pub level_window: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            local_gain: defaults::LOCAL_GAIN,
            remote_gain: defaults::REMOTE_GAIN,
            mix_interval: Duration::from_millis(defaults::MIX_INTERVAL_MS),
            frame_buffer: defaults::MIXED_FRAME_BUFFER,
            level_window: defaults::LEVEL_WINDOW_SAMPLES,
        }
    }
}

/// One tick's worth of mixed audio.
#[derive(Debug, Clone)]
pub struct MixedFrame {
    /// Mixed PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
    /// Timestamp when this frame was produced.
    pub timestamp: Instant,
}

struct MeterPair {
    local: LevelMeter,
    remote: LevelMeter,
}

struct MixerShared {
    gains: Mutex<(f32, f32)>,
    meters: Mutex<MeterPair>,
    running: AtomicBool,
}

/// Read-only view of the mixer's level meters and gains.
///
/// Cheap to clone; used by the orchestrator worker to meter audio without
/// owning the mixer.
#[derive(Clone)]
pub struct LevelProbe {
    shared: Arc<MixerShared>,
}

impl LevelProbe {
    /// Returns the current level of the named source (0.0 to 1.0).
    ///
    /// Returns 0.0 once the mixer has been released.
    pub fn level_of(&self, kind: SourceKind) -> f32 {
        if !self.shared.running.load(Ordering::SeqCst) {
            return 0.0;
        }
        self.shared
            .meters
            .lock()
            .map(|meters| match kind {
                SourceKind::Local => meters.local.level(),
                SourceKind::Remote => meters.remote.level(),
            })
            .unwrap_or(0.0)
    }
}

/// Applies per-source gain and sums two PCM buffers with saturation.
///
/// Buffers of unequal length are padded with silence. Gains are clamped to
/// `[0, MAX_GAIN]`.
pub fn mix_samples(local: &[i16], remote: &[i16], local_gain: f32, remote_gain: f32) -> Vec<i16> {
    let local_gain = local_gain.clamp(0.0, defaults::MAX_GAIN);
    let remote_gain = remote_gain.clamp(0.0, defaults::MAX_GAIN);
    let len = local.len().max(remote.len());
    let mut mixed = Vec::with_capacity(len);
    for i in 0..len {
        let l = local.get(i).copied().unwrap_or(0) as f32 * local_gain;
        let r = remote.get(i).copied().unwrap_or(0) as f32 * remote_gain;
        mixed.push((l + r).clamp(i16::MIN as f32, i16::MAX as f32) as i16);
    }
    mixed
}

/// Applies a gain to a PCM buffer with saturation.
fn apply_gain(samples: &[i16], gain: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Mixer over a local and a remote capture source.
pub struct AudioMixer {
    shared: Arc<MixerShared>,
    frames_rx: Receiver<MixedFrame>,
    pump: Option<JoinHandle<()>>,
}

impl AudioMixer {
    /// Acquires both capture devices from the provider and starts mixing.
    ///
    /// The local source is requested with voice cleanup enabled and the
    /// remote source with all processing disabled, per
    /// [`CaptureConstraints`].
    ///
    /// # Errors
    /// Propagates the provider's `PermissionDenied` / `DeviceNotFound` /
    /// `UnsupportedCapability` errors unchanged so callers can surface the
    /// actionable cause.
    pub async fn acquire(provider: &dyn CaptureProvider, config: MixerConfig) -> Result<Self> {
        Self::acquire_with(provider, config, Arc::new(LogReporter), Arc::new(SystemClock)).await
    }

    /// [`AudioMixer::acquire`] with a custom reporter and clock.
    pub async fn acquire_with(
        provider: &dyn CaptureProvider,
        config: MixerConfig,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let local = provider
            .request(SourceKind::Local, &CaptureConstraints::local())
            .await?;
        let remote = provider
            .request(SourceKind::Remote, &CaptureConstraints::remote())
            .await?;
        Self::mix_with(local, remote, config, reporter, clock)
    }

    /// Starts mixing two already-acquired sources.
    pub fn mix(
        local: Box<dyn CaptureSource>,
        remote: Box<dyn CaptureSource>,
        config: MixerConfig,
    ) -> Result<Self> {
        Self::mix_with(local, remote, config, Arc::new(LogReporter), Arc::new(SystemClock))
    }

    /// [`AudioMixer::mix`] with a custom reporter and clock.
    pub fn mix_with(
        mut local: Box<dyn CaptureSource>,
        mut remote: Box<dyn CaptureSource>,
        config: MixerConfig,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        local.start()?;
        if let Err(e) = remote.start() {
            // Roll back the local device before surfacing the failure
            if let Err(stop_err) = local.stop() {
                reporter.report(
                    "mixer",
                    &TaskError::Recoverable(format!("local source stop failed: {}", stop_err)),
                );
            }
            return Err(e);
        }

        let shared = Arc::new(MixerShared {
            gains: Mutex::new((
                config.local_gain.clamp(0.0, defaults::MAX_GAIN),
                config.remote_gain.clamp(0.0, defaults::MAX_GAIN),
            )),
            meters: Mutex::new(MeterPair {
                local: LevelMeter::with_capacity(config.level_window),
                remote: LevelMeter::with_capacity(config.level_window),
            }),
            running: AtomicBool::new(true),
        });

        let (frames_tx, frames_rx) = bounded(config.frame_buffer.max(1));
        let pump = {
            let shared = Arc::clone(&shared);
            let interval = config.mix_interval;
            thread::spawn(move || {
                run_pump(local, remote, shared, frames_tx, interval, reporter, clock);
            })
        };

        Ok(Self {
            shared,
            frames_rx,
            pump: Some(pump),
        })
    }

    /// Returns a receiver for the mixed output frames.
    ///
    /// This is the only consumer-facing route for mixed audio; frames are
    /// dropped when the channel is full so a slow consumer never stalls
    /// capture.
    pub fn frames(&self) -> Receiver<MixedFrame> {
        self.frames_rx.clone()
    }

    /// Returns a cloneable probe for the level meters.
    pub fn probe(&self) -> LevelProbe {
        LevelProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns the current level of the named source (0.0 to 1.0).
    pub fn level_of(&self, kind: SourceKind) -> f32 {
        self.probe().level_of(kind)
    }

    /// Sets the gain for the named source, saturating to [0, MAX_GAIN].
    pub fn set_gain(&self, kind: SourceKind, gain: f32) {
        let gain = gain.clamp(0.0, defaults::MAX_GAIN);
        if let Ok(mut gains) = self.shared.gains.lock() {
            match kind {
                SourceKind::Local => gains.0 = gain,
                SourceKind::Remote => gains.1 = gain,
            }
        }
    }

    /// Returns the current gain for the named source.
    pub fn gain(&self, kind: SourceKind) -> f32 {
        self.shared
            .gains
            .lock()
            .map(|gains| match kind {
                SourceKind::Local => gains.0,
                SourceKind::Remote => gains.1,
            })
            .unwrap_or(0.0)
    }

    /// Stops the pump thread and both capture devices.
    ///
    /// Idempotent; safe to call multiple times.
    pub fn release(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                eprintln!("meetscribe: mixer pump thread panicked");
            }
        }
    }

    /// Returns true while the pump is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_pump(
    mut local: Box<dyn CaptureSource>,
    mut remote: Box<dyn CaptureSource>,
    shared: Arc<MixerShared>,
    frames_tx: Sender<MixedFrame>,
    interval: Duration,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
) {
    while shared.running.load(Ordering::SeqCst) {
        let local_samples = read_or_report(&mut *local, "local", &reporter);
        let remote_samples = read_or_report(&mut *remote, "remote", &reporter);

        let (local_gain, remote_gain) = shared
            .gains
            .lock()
            .map(|g| *g)
            .unwrap_or((defaults::LOCAL_GAIN, defaults::REMOTE_GAIN));

        // Meters sit after the gain stage, matching what the mix carries
        let local_gained = apply_gain(&local_samples, local_gain);
        let remote_gained = apply_gain(&remote_samples, remote_gain);
        if let Ok(mut meters) = shared.meters.lock() {
            meters.local.push(&local_gained);
            meters.remote.push(&remote_gained);
        }

        if !local_gained.is_empty() || !remote_gained.is_empty() {
            let frame = MixedFrame {
                samples: mix_samples(&local_samples, &remote_samples, local_gain, remote_gain),
                timestamp: clock.now(),
            };
            match frames_tx.try_send(frame) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    // Nobody downstream; keep metering for level_of
                }
            }
        }

        thread::sleep(interval);
    }

    if let Err(e) = local.stop() {
        reporter.report(
            "mixer",
            &TaskError::Recoverable(format!("local source stop failed: {}", e)),
        );
    }
    if let Err(e) = remote.stop() {
        reporter.report(
            "mixer",
            &TaskError::Recoverable(format!("remote source stop failed: {}", e)),
        );
    }
}

fn read_or_report(
    source: &mut dyn CaptureSource,
    label: &str,
    reporter: &Arc<dyn ErrorReporter>,
) -> Vec<i16> {
    match source.read_samples() {
        Ok(samples) => samples,
        Err(e) => {
            reporter.report(
                "mixer",
                &TaskError::Recoverable(format!("{} source read failed: {}", label, e)),
            );
            Vec::new()
        }
    }
}

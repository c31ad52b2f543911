//! Real audio capture using CPAL (Cross-Platform Audio Library).
//!
//! Provides a [`CaptureProvider`] backed by the system audio stack. The
//! local source maps to a microphone input; the remote source maps to a
//! monitor/loopback device carrying the system (meeting) audio.

use crate::audio::source::{CaptureConstraints, CaptureProvider, CaptureSource, SourceKind};
use crate::error::{MeetscribeError, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Name patterns identifying monitor/loopback devices that carry system
/// audio (used for the remote source).
const MONITOR_PATTERNS: &[&str] = &["monitor", "loopback", "stereo mix", "what u hear"];

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

fn is_monitor_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    MONITOR_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Finds a capture device for the given source kind.
///
/// Local: a named device, or a preferred backend device, or the system
/// default input. Remote: a named device, or the first monitor/loopback
/// input.
fn find_device(kind: SourceKind, name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(wanted) = name {
            let devices = host
                .input_devices()
                .map_err(|e| MeetscribeError::AudioCapture {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            return Err(MeetscribeError::DeviceNotFound {
                device: wanted.to_string(),
            });
        }

        match kind {
            SourceKind::Local => {
                if let Ok(devices) = host.input_devices() {
                    for device in devices {
                        if device.name().map(|n| is_preferred_device(&n)).unwrap_or(false) {
                            return Ok(device);
                        }
                    }
                }
                host.default_input_device()
                    .ok_or_else(|| MeetscribeError::DeviceNotFound {
                        device: "default input".to_string(),
                    })
            }
            SourceKind::Remote => {
                if let Ok(devices) = host.input_devices() {
                    for device in devices {
                        if device.name().map(|n| is_monitor_device(&n)).unwrap_or(false) {
                            return Ok(device);
                        }
                    }
                }
                Err(MeetscribeError::DeviceNotFound {
                    device: "system audio monitor".to_string(),
                })
            }
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from one thread at a time through the
/// Mutex wrapper in CpalCaptureSource, and its methods are called
/// synchronously.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real capture source backed by a CPAL input stream.
///
/// Captures 16-bit PCM mono at the requested rate. Tries an i16 stream
/// first, then an f32 stream with software conversion; anything else is an
/// `UnsupportedCapability` error.
///
/// Processing constraints (echo cancellation, noise suppression, AGC) are
/// applied by the platform audio server, not by cpal; they are carried in
/// the constraints for provider implementations that can honor them.
pub struct CpalCaptureSource {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalCaptureSource {
    fn new(device: cpal::Device, sample_rate: u32) -> Self {
        Self {
            device,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
        }
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("meetscribe: audio stream error: {}", err);
        };

        // i16 mono at the requested rate — PipeWire/PulseAudio convert
        // transparently
        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // f32 fallback for devices that only expose float formats
        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => MeetscribeError::DeviceNotFound {
                    device: self.device.name().unwrap_or_else(|_| "unknown".to_string()),
                },
                cpal::BuildStreamError::StreamConfigNotSupported => {
                    MeetscribeError::UnsupportedCapability {
                        capability: format!("mono i16/f32 capture at {}Hz", self.sample_rate),
                    }
                }
                other => MeetscribeError::AudioCapture {
                    message: format!("Failed to build input stream: {}", other),
                },
            })
    }
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self) -> Result<()> {
        let mut guard = self.stream.lock().map_err(|_| MeetscribeError::AudioCapture {
            message: "stream lock poisoned".to_string(),
        })?;
        if guard.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| MeetscribeError::AudioCapture {
            message: format!("Failed to start stream: {}", e),
        })?;
        *guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Ok(mut guard) = self.stream.lock() {
            // Dropping the stream stops capture
            guard.take();
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buf = self.buffer.lock().map_err(|_| MeetscribeError::AudioCapture {
            message: "buffer lock poisoned".to_string(),
        })?;
        Ok(std::mem::take(&mut *buf))
    }
}

/// Capture provider backed by the system audio stack.
#[derive(Debug, Clone, Default)]
pub struct CpalCaptureProvider {
    /// Optional explicit device name for the local source.
    pub local_device: Option<String>,
    /// Optional explicit device name for the remote/monitor source.
    pub remote_device: Option<String>,
}

impl CpalCaptureProvider {
    /// Creates a provider using automatic device selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with explicit device names from configuration.
    pub fn with_devices(local: Option<String>, remote: Option<String>) -> Self {
        Self {
            local_device: local,
            remote_device: remote,
        }
    }
}

#[async_trait]
impl CaptureProvider for CpalCaptureProvider {
    async fn request(
        &self,
        kind: SourceKind,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSource>> {
        let name = match kind {
            SourceKind::Local => self.local_device.clone(),
            SourceKind::Remote => self.remote_device.clone(),
        };
        let sample_rate = constraints.sample_rate;
        // Device probing walks the backend list and can block; keep it off
        // the async executor.
        let device = tokio::task::spawn_blocking(move || find_device(kind, name.as_deref()))
            .await
            .map_err(|e| MeetscribeError::AudioCapture {
                message: format!("device probe task failed: {}", e),
            })??;
        Ok(Box::new(CpalCaptureSource::new(device, sample_rate)))
    }
}

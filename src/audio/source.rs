use crate::defaults;
use crate::error::{MeetscribeError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Which of the two independently acquired audio sources is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// The local participant's capture device (microphone).
    Local,
    /// The remote/system capture device carrying the other participants.
    Remote,
}

impl SourceKind {
    /// Lowercase label for error messages and reporting.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::Remote => "remote",
        }
    }
}

/// Capture constraints requested from the device layer.
///
/// The remote source keeps processing disabled so the original speaker
/// voices arrive unaltered; the local source enables it so the local
/// participant's voice is cleaned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
}

impl CaptureConstraints {
    /// Constraints for the local microphone: voice cleanup enabled.
    pub fn local() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }

    /// Constraints for the remote/system source: processing disabled to
    /// preserve every original speaker voice.
    pub fn remote() -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Trait for audio capture devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait CaptureSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the audio samples captured since the previous read.
    ///
    /// # Returns
    /// Vector of 16-bit PCM audio samples, possibly empty, or an error
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// Trait for acquiring capture devices.
///
/// Requesting a device conceptually awaits an external permission grant,
/// which is why this is the one async seam in the audio layer. Failures
/// must distinguish the three acquisition causes so callers can surface an
/// actionable message.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Requests a capture source of the given kind with the given
    /// constraints.
    ///
    /// # Errors
    /// - `PermissionDenied` when the user or system refuses access
    /// - `DeviceNotFound` when no matching device exists
    /// - `UnsupportedCapability` when the device cannot honor a constraint
    async fn request(
        &self,
        kind: SourceKind,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSource>>;
}

/// Mock audio source for testing
pub struct MockCaptureSource {
    is_started: bool,
    batches: Arc<Mutex<VecDeque<Vec<i16>>>>,
    repeat: Option<Vec<i16>>,
    should_fail_start: bool,
    should_fail_read: bool,
}

impl MockCaptureSource {
    /// Create a new mock capture source producing silence
    pub fn new() -> Self {
        Self {
            is_started: false,
            batches: Arc::new(Mutex::new(VecDeque::new())),
            repeat: Some(vec![0i16; 160]),
            should_fail_start: false,
            should_fail_read: false,
        }
    }

    /// Configure the mock to return the same samples on every read
    pub fn with_repeating_samples(mut self, samples: Vec<i16>) -> Self {
        self.repeat = Some(samples);
        self
    }

    /// Configure the mock to return the given batches in order, then empty
    /// reads
    pub fn with_batches(mut self, batches: Vec<Vec<i16>>) -> Self {
        self.batches = Arc::new(Mutex::new(batches.into()));
        self.repeat = None;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Returns a handle for pushing batches while the source is in use.
    pub fn feed(&self) -> MockSourceFeed {
        MockSourceFeed {
            batches: Arc::clone(&self.batches),
        }
    }

    /// Returns true if start() has been called without a matching stop().
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for feeding sample batches into a [`MockCaptureSource`] from a
/// test while the source itself is owned by the mixer.
#[derive(Clone)]
pub struct MockSourceFeed {
    batches: Arc<Mutex<VecDeque<Vec<i16>>>>,
}

impl MockSourceFeed {
    /// Queues one batch for the next read.
    pub fn push(&self, samples: Vec<i16>) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push_back(samples);
        }
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(MeetscribeError::AudioCapture {
                message: "mock start failure".to_string(),
            });
        }
        self.is_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(MeetscribeError::AudioCapture {
                message: "mock read failure".to_string(),
            });
        }
        if let Ok(mut batches) = self.batches.lock() {
            if let Some(batch) = batches.pop_front() {
                return Ok(batch);
            }
        }
        Ok(self.repeat.clone().unwrap_or_default())
    }
}

/// How a [`MockCaptureProvider`] should answer a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockOutcome {
    Grant,
    DenyPermission,
    NoDevice,
    Unsupported,
}

/// Mock capture provider for testing acquisition flows.
pub struct MockCaptureProvider {
    outcome: MockOutcome,
    sources: Mutex<VecDeque<MockCaptureSource>>,
    requested: Mutex<Vec<(SourceKind, CaptureConstraints)>>,
}

impl MockCaptureProvider {
    /// Provider that grants every request with a silent source.
    pub fn new() -> Self {
        Self {
            outcome: MockOutcome::Grant,
            sources: Mutex::new(VecDeque::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Provider that grants requests with the given sources, in order.
    pub fn with_sources(sources: Vec<MockCaptureSource>) -> Self {
        Self {
            outcome: MockOutcome::Grant,
            sources: Mutex::new(sources.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Provider that denies every request with `PermissionDenied`.
    pub fn denying_permission() -> Self {
        Self {
            outcome: MockOutcome::DenyPermission,
            sources: Mutex::new(VecDeque::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Provider that fails every request with `DeviceNotFound`.
    pub fn without_devices() -> Self {
        Self {
            outcome: MockOutcome::NoDevice,
            sources: Mutex::new(VecDeque::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Provider that fails every request with `UnsupportedCapability`.
    pub fn unsupported() -> Self {
        Self {
            outcome: MockOutcome::Unsupported,
            sources: Mutex::new(VecDeque::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Returns the `(kind, constraints)` pairs requested so far.
    pub fn requests(&self) -> Vec<(SourceKind, CaptureConstraints)> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Default for MockCaptureProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureProvider for MockCaptureProvider {
    async fn request(
        &self,
        kind: SourceKind,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSource>> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push((kind, *constraints));
        }
        match self.outcome {
            MockOutcome::Grant => {
                let source = self
                    .sources
                    .lock()
                    .ok()
                    .and_then(|mut s| s.pop_front())
                    .unwrap_or_default();
                Ok(Box::new(source))
            }
            MockOutcome::DenyPermission => Err(MeetscribeError::PermissionDenied {
                kind: kind.label().to_string(),
                message: "capture access was dismissed".to_string(),
            }),
            MockOutcome::NoDevice => Err(MeetscribeError::DeviceNotFound {
                device: kind.label().to_string(),
            }),
            MockOutcome::Unsupported => Err(MeetscribeError::UnsupportedCapability {
                capability: format!("{} capture at {}Hz", kind.label(), constraints.sample_rate),
            }),
        }
    }
}

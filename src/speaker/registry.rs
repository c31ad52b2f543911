//! Participant name-candidate registry.
//!
//! Periodically samples a visual frame source, runs a pluggable
//! name-extraction capability over the frame and maintains a time-stamped
//! registry of speaker candidates. Extraction is best-effort: a failed tick
//! is reported and simply yields zero candidates.

use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::error::{MeetscribeError, Result};
use crate::report::{ErrorReporter, LogReporter, TaskError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A still image sampled from the visual frame source.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Raw image bytes; the format is an agreement between the frame
    /// source and the extractor.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Trait for visual frame sources (e.g. a live meeting video).
///
/// The source is read-only; sampling must never mutate it.
pub trait FrameSource: Send + Sync {
    /// True once the source has produced its first frame.
    fn is_ready(&self) -> bool;

    /// Samples the current frame as a still image.
    fn sample(&self) -> Result<FrameSample>;
}

/// A name hypothesis extracted from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NameCandidate {
    pub name: String,
    /// Extraction confidence in [0, 1].
    pub confidence: f32,
}

impl NameCandidate {
    /// Creates a candidate, clamping confidence to [0, 1].
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Pluggable name-extraction capability.
///
/// The orchestration contract only requires a list of candidates per frame;
/// a real OCR/vision implementation can be substituted without touching the
/// registry or its consumers.
pub trait FrameToCandidates: Send + Sync {
    /// Extracts zero or more name candidates from the frame.
    fn extract(&self, frame: &FrameSample) -> Result<Vec<NameCandidate>>;
}

/// A registered speaker candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerCandidate {
    pub id: String,
    pub name: String,
    pub first_seen: Instant,
    pub last_seen: Instant,
    /// Best extraction confidence seen so far; never decreases.
    pub confidence: f32,
    /// True if the candidate was detected on the most recent tick.
    pub is_active: bool,
}

struct RegistryState {
    /// Candidates in insertion order; never removed until detach.
    candidates: Vec<SpeakerCandidate>,
    /// Id of the most recently (re-)detected candidate.
    highlighted: Option<String>,
    next_id: usize,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            highlighted: None,
            next_id: 1,
        }
    }
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    running: AtomicBool,
    sampler: Mutex<Option<JoinHandle<()>>>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
    scan_interval: Duration,
}

/// Registry of participant names observed from the visual channel.
///
/// Cloneable handle over shared state, so the sampler thread and the
/// speaker identifier can observe the same registry.
#[derive(Clone)]
pub struct NameCandidateRegistry {
    inner: Arc<RegistryInner>,
}

impl NameCandidateRegistry {
    /// Creates a registry with the default clock, reporter and interval.
    pub fn new() -> Self {
        Self::with_options(
            Arc::new(SystemClock),
            Arc::new(LogReporter),
            Duration::from_millis(defaults::SCAN_INTERVAL_MS),
        )
    }

    /// Creates a registry with a custom clock, reporter and scan interval.
    pub fn with_options(
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn ErrorReporter>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::new()),
                running: AtomicBool::new(false),
                sampler: Mutex::new(None),
                clock,
                reporter,
                scan_interval,
            }),
        }
    }

    /// Begins periodic sampling of the frame source.
    ///
    /// Sampling starts once the source reports its first frame. Idempotent
    /// against repeated attachment; only the first call spawns a sampler.
    pub fn attach(&self, frame_source: Arc<dyn FrameSource>, extractor: Arc<dyn FrameToCandidates>) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let registry = self.clone();
        let handle = thread::spawn(move || {
            registry.run_sampler(frame_source, extractor);
        });
        if let Ok(mut sampler) = self.inner.sampler.lock() {
            *sampler = Some(handle);
        }
    }

    fn run_sampler(&self, frame_source: Arc<dyn FrameSource>, extractor: Arc<dyn FrameToCandidates>) {
        let poll = Duration::from_millis(50);

        // Wait for the first frame
        while self.inner.running.load(Ordering::SeqCst) && !frame_source.is_ready() {
            thread::sleep(poll);
        }

        while self.inner.running.load(Ordering::SeqCst) {
            match frame_source.sample().and_then(|frame| extractor.extract(&frame)) {
                Ok(candidates) => self.ingest(&candidates),
                Err(e) => {
                    // Failed ticks yield zero candidates and never propagate
                    self.inner.reporter.report(
                        "registry",
                        &TaskError::Recoverable(format!("extraction tick failed: {}", e)),
                    );
                    self.ingest(&[]);
                }
            }

            // Sleep in slices so detach() is responsive
            let mut remaining = self.inner.scan_interval;
            while self.inner.running.load(Ordering::SeqCst) && remaining > Duration::ZERO {
                let step = remaining.min(poll);
                thread::sleep(step);
                remaining -= step;
            }
        }
    }

    /// Applies one sampling tick's extracted candidates to the registry.
    ///
    /// All previously registered candidates are marked inactive; each
    /// extracted name is then upserted (`first_seen = last_seen = now` on
    /// first sight; `last_seen` bumped, confidence max-merged and
    /// `is_active` set on re-detection). Public so deterministic tests and
    /// external extraction drivers can feed the registry directly.
    pub fn ingest(&self, candidates: &[NameCandidate]) {
        let now = self.inner.clock.now();
        let mut state = match self.inner.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };

        for candidate in &mut state.candidates {
            candidate.is_active = false;
        }

        let mut last_detected = None;
        for extracted in candidates {
            let name = extracted.name.trim();
            if name.is_empty() {
                continue;
            }
            let confidence = extracted.confidence.clamp(0.0, 1.0);

            if let Some(existing) = state.candidates.iter_mut().find(|c| c.name == name) {
                existing.last_seen = now;
                existing.confidence = existing.confidence.max(confidence);
                existing.is_active = true;
                last_detected = Some(existing.id.clone());
            } else {
                let id = format!("speaker_{}", state.next_id);
                state.next_id += 1;
                state.candidates.push(SpeakerCandidate {
                    id: id.clone(),
                    name: name.to_string(),
                    first_seen: now,
                    last_seen: now,
                    confidence,
                    is_active: true,
                });
                last_detected = Some(id);
            }
        }

        if last_detected.is_some() {
            state.highlighted = last_detected;
        }
    }

    /// Returns all registered candidates in insertion order.
    pub fn candidates(&self) -> Vec<SpeakerCandidate> {
        self.inner
            .state
            .lock()
            .map(|state| state.candidates.clone())
            .unwrap_or_default()
    }

    /// Returns the most recently (re-)detected candidate, if it is still
    /// active.
    pub fn current_highlighted(&self) -> Option<SpeakerCandidate> {
        let state = self.inner.state.lock().ok()?;
        let id = state.highlighted.as_ref()?;
        state
            .candidates
            .iter()
            .find(|c| &c.id == id && c.is_active)
            .cloned()
    }

    /// Number of registered candidates.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.candidates.len())
            .unwrap_or(0)
    }

    /// True if no candidate has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a sampler is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stops sampling and clears the registry. Idempotent.
    pub fn detach(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let handle = self
            .inner
            .sampler
            .lock()
            .ok()
            .and_then(|mut sampler| sampler.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                eprintln!("meetscribe: registry sampler thread panicked");
            }
        }
        if let Ok(mut state) = self.inner.state.lock() {
            *state = RegistryState::new();
        }
    }
}

impl Default for NameCandidateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame source that is always ready and returns an empty frame.
///
/// Stands in for a live video element in tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticFrameSource {
    width: u32,
    height: u32,
}

impl StaticFrameSource {
    /// Creates a 0x0 static frame source.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for StaticFrameSource {
    fn is_ready(&self) -> bool {
        true
    }

    fn sample(&self) -> Result<FrameSample> {
        Ok(FrameSample {
            data: Vec::new(),
            width: self.width,
            height: self.height,
        })
    }
}

/// Extractor returning a fixed candidate list on every tick.
///
/// The extraction method is a pluggable capability; this simulated variant
/// is what tests and demos run against.
pub struct SimulatedExtractor {
    candidates: Mutex<Vec<NameCandidate>>,
    should_fail: bool,
}

impl SimulatedExtractor {
    /// Creates an extractor that reports the given candidates each tick.
    pub fn new(candidates: Vec<NameCandidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            should_fail: false,
        }
    }

    /// Creates an extractor that fails every tick.
    pub fn failing() -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            should_fail: true,
        }
    }

    /// Replaces the candidate list reported on subsequent ticks.
    pub fn set_candidates(&self, candidates: Vec<NameCandidate>) {
        if let Ok(mut current) = self.candidates.lock() {
            *current = candidates;
        }
    }
}

impl FrameToCandidates for SimulatedExtractor {
    fn extract(&self, _frame: &FrameSample) -> Result<Vec<NameCandidate>> {
        if self.should_fail {
            return Err(MeetscribeError::FrameExtraction {
                message: "simulated extraction failure".to_string(),
            });
        }
        Ok(self
            .candidates
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::report::CollectingReporter;

    fn test_registry(clock: &MockClock) -> NameCandidateRegistry {
        NameCandidateRegistry::with_options(
            Arc::new(clock.clone()),
            Arc::new(LogReporter),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_ingest_inserts_in_order() {
        let clock = MockClock::new();
        let registry = test_registry(&clock);

        registry.ingest(&[
            NameCandidate::new("Alice", 0.9),
            NameCandidate::new("Bob", 0.7),
        ]);

        let candidates = registry.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Alice");
        assert_eq!(candidates[0].id, "speaker_1");
        assert_eq!(candidates[1].name, "Bob");
        assert_eq!(candidates[1].id, "speaker_2");
        assert!(candidates.iter().all(|c| c.is_active));
    }

    #[test]
    fn test_ingest_marks_missing_candidates_inactive() {
        let clock = MockClock::new();
        let registry = test_registry(&clock);

        registry.ingest(&[
            NameCandidate::new("Alice", 0.9),
            NameCandidate::new("Bob", 0.7),
        ]);
        registry.ingest(&[NameCandidate::new("Bob", 0.8)]);

        let candidates = registry.candidates();
        assert!(!candidates[0].is_active);
        assert!(candidates[1].is_active);
        // Registry grows monotonically; Alice stays registered
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_confidence_never_decreases() {
        let clock = MockClock::new();
        let registry = test_registry(&clock);

        registry.ingest(&[NameCandidate::new("Alice", 0.9)]);
        registry.ingest(&[NameCandidate::new("Alice", 0.3)]);

        let candidates = registry.candidates();
        assert!((candidates[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_last_seen_advances() {
        let clock = MockClock::new();
        let registry = test_registry(&clock);

        registry.ingest(&[NameCandidate::new("Alice", 0.5)]);
        let first = registry.candidates()[0].clone();

        clock.advance(Duration::from_secs(2));
        registry.ingest(&[NameCandidate::new("Alice", 0.5)]);
        let second = registry.candidates()[0].clone();

        assert_eq!(first.first_seen, second.first_seen);
        assert_eq!(second.last_seen - first.last_seen, Duration::from_secs(2));
    }

    #[test]
    fn test_highlighted_is_last_detected_active() {
        let clock = MockClock::new();
        let registry = test_registry(&clock);

        registry.ingest(&[
            NameCandidate::new("Alice", 0.9),
            NameCandidate::new("Bob", 0.7),
        ]);
        assert_eq!(registry.current_highlighted().unwrap().name, "Bob");

        registry.ingest(&[NameCandidate::new("Alice", 0.9)]);
        assert_eq!(registry.current_highlighted().unwrap().name, "Alice");

        // A zero-candidate tick deactivates everyone; no stale highlight
        registry.ingest(&[]);
        assert!(registry.current_highlighted().is_none());
    }

    #[test]
    fn test_empty_names_are_skipped() {
        let clock = MockClock::new();
        let registry = test_registry(&clock);

        registry.ingest(&[NameCandidate::new("  ", 0.9), NameCandidate::new("", 0.9)]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_attach_is_idempotent_and_detach_clears() {
        let registry = test_registry(&MockClock::new());
        let source = Arc::new(StaticFrameSource::new());
        let extractor = Arc::new(SimulatedExtractor::new(vec![NameCandidate::new(
            "Alice", 0.9,
        )]));

        registry.attach(source.clone(), extractor.clone());
        registry.attach(source, extractor);
        assert!(registry.is_attached());

        // The sampler ticks on real time (thread sleeps), so wait for it
        let deadline = Instant::now() + Duration::from_secs(2);
        while registry.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!registry.is_empty());

        registry.detach();
        registry.detach();
        assert!(!registry.is_attached());
        assert!(registry.is_empty());
        assert!(registry.current_highlighted().is_none());
    }

    #[test]
    fn test_extraction_failure_is_reported_not_fatal() {
        let reporter = Arc::new(CollectingReporter::new());
        let registry = NameCandidateRegistry::with_options(
            Arc::new(SystemClock),
            reporter.clone(),
            Duration::from_millis(10),
        );

        registry.attach(
            Arc::new(StaticFrameSource::new()),
            Arc::new(SimulatedExtractor::failing()),
        );

        let deadline = Instant::now() + Duration::from_secs(2);
        while reporter.reports().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        registry.detach();

        let reports = reporter.reports();
        assert!(!reports.is_empty());
        assert_eq!(reports[0].0, "registry");
        assert!(reports[0].1.contains("extraction tick failed"));
        assert!(registry.is_empty());
    }
}

//! Transcription orchestrator: owns the continuous recognition session
//! lifecycle and produces the canonical transcript buffer.
//!
//! All mutation of the buffer and the identifier happens on one worker
//! thread draining a single event channel, which serializes the three
//! asynchronous inputs (recognition events, restart deadlines, shutdown)
//! without fine-grained locking. Restart deadlines are checked against the
//! liveness flag and a session generation counter, so a `stop()` issued
//! while a restart is pending always wins and no zombie session can come
//! back up.

use crate::audio::mixer::{AudioMixer, LevelProbe, MixerConfig};
use crate::audio::source::{CaptureProvider, SourceKind};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::defaults;
use crate::error::{MeetscribeError, Result};
use crate::recognition::session::{
    RecognitionEngine, RecognitionResult, RecognitionSession, SessionEvent,
};
use crate::report::{ErrorReporter, LogReporter, TaskError};
use crate::speaker::identifier::{SpeakerIdentifier, SpeakerStats};
use crate::speaker::registry::{FrameSource, FrameToCandidates, NameCandidateRegistry};
use crate::transcript::{EntryDraft, TranscriptBuffer, TranscriptionEntry};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the worker re-checks liveness while idle, and the upper bound
/// on how long `stop()` waits for the worker to notice.
const WORKER_POLL: Duration = Duration::from_millis(25);

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Nothing wired yet, or torn down by `cleanup()`.
    Idle,
    /// Audio graph and identifier wired; session constructed but not
    /// started.
    Ready,
    /// Recognition session running (restarts included).
    Active,
    /// Session stopped; buffer retained.
    Stopped,
}

/// Tuning for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mixer: MixerConfig,
    pub speaking_threshold: f32,
    pub switch_cooldown: Duration,
    pub scan_interval: Duration,
    /// Delay before restarting after a transient recognition error.
    pub error_restart_delay: Duration,
    /// Delay before relaunching after a spontaneous session end.
    pub end_restart_delay: Duration,
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            speaking_threshold: defaults::SPEAKING_THRESHOLD,
            switch_cooldown: Duration::from_millis(defaults::SWITCH_COOLDOWN_MS),
            scan_interval: Duration::from_millis(defaults::SCAN_INTERVAL_MS),
            error_restart_delay: Duration::from_millis(defaults::ERROR_RESTART_DELAY_MS),
            end_restart_delay: Duration::from_millis(defaults::END_RESTART_DELAY_MS),
            event_buffer: defaults::EVENT_BUFFER,
        }
    }
}

impl OrchestratorConfig {
    /// Builds orchestrator tuning from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            mixer: MixerConfig {
                local_gain: config.audio.local_gain,
                remote_gain: config.audio.remote_gain,
                ..MixerConfig::default()
            },
            speaking_threshold: config.speaker.speaking_threshold,
            switch_cooldown: Duration::from_millis(config.speaker.switch_cooldown_ms),
            scan_interval: Duration::from_millis(config.speaker.scan_interval_ms),
            error_restart_delay: Duration::from_millis(config.recognition.error_restart_delay_ms),
            end_restart_delay: Duration::from_millis(config.recognition.end_restart_delay_ms),
            event_buffer: defaults::EVENT_BUFFER,
        }
    }
}

type UpdateCallback = Arc<dyn Fn(&[TranscriptionEntry]) + Send + Sync>;

struct SharedState {
    buffer: Mutex<TranscriptBuffer>,
    identifier: Mutex<SpeakerIdentifier>,
    subscriber: Mutex<Option<UpdateCallback>>,
    /// Liveness flag; pending restarts must no-op once this clears.
    active: AtomicBool,
    /// Bumped on every start/stop so stale workers and restarts retire.
    generation: AtomicU64,
}

/// Orchestrates audio capture, speaker attribution and a self-healing
/// continuous recognition session into one transcript buffer.
pub struct TranscriptionOrchestrator {
    engine: Arc<dyn RecognitionEngine>,
    provider: Arc<dyn CaptureProvider>,
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
    extractor: Option<Arc<dyn FrameToCandidates>>,
    registry: NameCandidateRegistry,
    shared: Arc<SharedState>,
    mixer: Option<AudioMixer>,
    pending_session: Option<Box<dyn RecognitionSession>>,
    worker: Option<JoinHandle<()>>,
    state: OrchestratorState,
}

impl TranscriptionOrchestrator {
    /// Creates an orchestrator with default tuning, clock and reporter.
    pub fn new(engine: Arc<dyn RecognitionEngine>, provider: Arc<dyn CaptureProvider>) -> Self {
        Self::build(
            engine,
            provider,
            OrchestratorConfig::default(),
            Arc::new(SystemClock),
            Arc::new(LogReporter),
            None,
        )
    }

    fn build(
        engine: Arc<dyn RecognitionEngine>,
        provider: Arc<dyn CaptureProvider>,
        config: OrchestratorConfig,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn ErrorReporter>,
        extractor: Option<Arc<dyn FrameToCandidates>>,
    ) -> Self {
        let registry = NameCandidateRegistry::with_options(
            Arc::clone(&clock),
            Arc::clone(&reporter),
            config.scan_interval,
        );
        let mut identifier = SpeakerIdentifier::new(registry.clone());
        identifier.set_speaking_threshold(config.speaking_threshold);
        identifier.set_switch_cooldown(config.switch_cooldown);

        Self {
            engine,
            provider,
            config,
            clock,
            reporter,
            extractor,
            registry,
            shared: Arc::new(SharedState {
                buffer: Mutex::new(TranscriptBuffer::new()),
                identifier: Mutex::new(identifier),
                subscriber: Mutex::new(None),
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            mixer: None,
            pending_session: None,
            worker: None,
            state: OrchestratorState::Idle,
        }
    }

    /// Replaces the tuning. Must be called before `initialize()`.
    ///
    /// The builders rebuild the registry and identifier from clones of the
    /// handles; moving the fields out is not possible on a `Drop` type.
    pub fn with_config(self, config: OrchestratorConfig) -> Self {
        Self::build(
            Arc::clone(&self.engine),
            Arc::clone(&self.provider),
            config,
            Arc::clone(&self.clock),
            Arc::clone(&self.reporter),
            self.extractor.clone(),
        )
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::build(
            Arc::clone(&self.engine),
            Arc::clone(&self.provider),
            self.config.clone(),
            clock,
            Arc::clone(&self.reporter),
            self.extractor.clone(),
        )
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(self, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self::build(
            Arc::clone(&self.engine),
            Arc::clone(&self.provider),
            self.config.clone(),
            Arc::clone(&self.clock),
            reporter,
            self.extractor.clone(),
        )
    }

    /// Sets the name-extraction capability used when a frame source is
    /// attached at `initialize()`.
    pub fn with_extractor(self, extractor: Arc<dyn FrameToCandidates>) -> Self {
        Self::build(
            Arc::clone(&self.engine),
            Arc::clone(&self.provider),
            self.config.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.reporter),
            Some(extractor),
        )
    }

    /// Wires the audio graph, the identifier and the recognition session.
    ///
    /// When a frame source is given and an extractor is configured, the
    /// name-candidate registry starts sampling; without either, speaker
    /// attribution runs in generic mode.
    ///
    /// # Errors
    /// - `UnsupportedPlatform` when the engine has no continuous
    ///   recognition capability; fatal, the orchestrator stays `Idle`
    /// - `InitializationFailed` wrapping the mixer acquisition cause
    ///   (permission / device / capability); fatal, do not call `start()`
    pub async fn initialize(&mut self, frame_source: Option<Arc<dyn FrameSource>>) -> Result<()> {
        if self.state != OrchestratorState::Idle {
            return Ok(());
        }

        let session = self.engine.create_session()?;

        let mixer = AudioMixer::acquire_with(
            self.provider.as_ref(),
            self.config.mixer.clone(),
            Arc::clone(&self.reporter),
            Arc::clone(&self.clock),
        )
        .await
        .map_err(MeetscribeError::into_init_failure)?;

        if let (Some(frame_source), Some(extractor)) = (frame_source, self.extractor.clone()) {
            self.registry.attach(frame_source, extractor);
        }

        self.mixer = Some(mixer);
        self.pending_session = Some(session);
        self.state = OrchestratorState::Ready;
        Ok(())
    }

    /// Starts the recognition session.
    ///
    /// # Errors
    /// `NotInitialized` when called before a successful `initialize()`.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            OrchestratorState::Active => return Ok(()),
            OrchestratorState::Idle => return Err(MeetscribeError::NotInitialized),
            OrchestratorState::Ready | OrchestratorState::Stopped => {}
        }

        let probe = match &self.mixer {
            Some(mixer) => mixer.probe(),
            None => return Err(MeetscribeError::NotInitialized),
        };
        let session = match self.pending_session.take() {
            Some(session) => session,
            None => self.engine.create_session()?,
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.active.store(true, Ordering::SeqCst);

        let worker = WorkerContext {
            session,
            shared: Arc::clone(&self.shared),
            probe,
            clock: Arc::clone(&self.clock),
            reporter: Arc::clone(&self.reporter),
            error_restart_delay: self.config.error_restart_delay,
            end_restart_delay: self.config.end_restart_delay,
            event_buffer: self.config.event_buffer,
            generation,
        };
        self.worker = Some(thread::spawn(move || worker.run()));
        self.state = OrchestratorState::Active;
        Ok(())
    }

    /// Stops the recognition session. The buffer is retained.
    ///
    /// Effective even while a restart is pending: the scheduled restart
    /// observes the cleared liveness flag and no-ops.
    pub fn stop(&mut self) {
        if self.state != OrchestratorState::Active {
            return;
        }
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                eprintln!("meetscribe: recognition worker thread panicked");
            }
        }
        self.state = OrchestratorState::Stopped;
    }

    /// Tears everything down: session stopped, mixer released, registry
    /// detached, buffer cleared. Idempotent.
    pub fn cleanup(&mut self) {
        self.stop();
        self.pending_session = None;
        if let Some(mut mixer) = self.mixer.take() {
            mixer.release();
        }
        self.registry.detach();
        if let Ok(mut buffer) = self.shared.buffer.lock() {
            buffer.clear();
        }
        if let Ok(mut identifier) = self.shared.identifier.lock() {
            identifier.reset();
        }
        self.state = OrchestratorState::Idle;
    }

    /// Registers the subscriber invoked (from the worker thread) with a
    /// buffer snapshot on every change, interim updates included.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&[TranscriptionEntry]) + Send + Sync + 'static,
    {
        if let Ok(mut subscriber) = self.shared.subscriber.lock() {
            *subscriber = Some(Arc::new(callback));
        }
    }

    /// Final entries only, in insertion order.
    ///
    /// Append-only and prefix-stable across calls within a session.
    pub fn transcription_history(&self) -> Vec<TranscriptionEntry> {
        self.shared
            .buffer
            .lock()
            .map(|buffer| buffer.finals())
            .unwrap_or_default()
    }

    /// Per-speaker statistics aggregated from the activity history.
    pub fn speaker_stats(&self) -> HashMap<String, SpeakerStats> {
        self.shared
            .identifier
            .lock()
            .map(|identifier| identifier.speaker_stats())
            .unwrap_or_default()
    }

    /// Adjusts both source gains, saturating to the mixer's [0, 3] range.
    pub fn adjust_audio_levels(&self, local_gain: f32, remote_gain: f32) {
        if let Some(mixer) = &self.mixer {
            mixer.set_gain(SourceKind::Local, local_gain);
            mixer.set_gain(SourceKind::Remote, remote_gain);
        }
    }

    /// Current meter reading for the named source; 0.0 before
    /// initialization.
    pub fn audio_level(&self, kind: SourceKind) -> f32 {
        self.mixer
            .as_ref()
            .map(|mixer| mixer.level_of(kind))
            .unwrap_or(0.0)
    }

    /// Forwards to the identifier's speech threshold, clamped to [0, 1].
    pub fn set_speaking_threshold(&self, threshold: f32) {
        if let Ok(mut identifier) = self.shared.identifier.lock() {
            identifier.set_speaking_threshold(threshold);
        }
    }

    /// The registry handle, for observing discovered participants.
    pub fn registry(&self) -> &NameCandidateRegistry {
        &self.registry
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// True while the session is meant to be running.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }
}

impl Drop for TranscriptionOrchestrator {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct WorkerContext {
    session: Box<dyn RecognitionSession>,
    shared: Arc<SharedState>,
    probe: LevelProbe,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
    error_restart_delay: Duration,
    end_restart_delay: Duration,
    event_buffer: usize,
    generation: u64,
}

impl WorkerContext {
    fn live(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
            && self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    fn run(mut self) {
        let (events_tx, events_rx) = bounded::<SessionEvent>(self.event_buffer.max(1));

        // A scheduled relaunch deadline; None while a session is healthy
        let mut restart_at: Option<Instant> = None;

        if let Err(e) = self.session.start(events_tx.clone()) {
            self.reporter.report(
                "recognition",
                &TaskError::Recoverable(format!("session start failed: {}", e)),
            );
            restart_at = Some(Instant::now() + self.error_restart_delay);
        }

        while self.live() {
            let timeout = match restart_at {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(WORKER_POLL),
                None => WORKER_POLL,
            };

            match events_rx.recv_timeout(timeout) {
                Ok(SessionEvent::Results {
                    result_index,
                    results,
                }) => {
                    self.handle_results(result_index, &results);
                }
                Ok(SessionEvent::Error(kind)) => {
                    // Transient by contract: absorb, observe, relaunch
                    self.reporter.report(
                        "recognition",
                        &TaskError::Recoverable(format!("transient recognition error: {}", kind)),
                    );
                    restart_at = Some(Instant::now() + self.error_restart_delay);
                }
                Ok(SessionEvent::Ended) => {
                    // Continuous sessions end periodically by design
                    restart_at = Some(Instant::now() + self.end_restart_delay);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(deadline) = restart_at {
                if Instant::now() >= deadline {
                    restart_at = None;
                    // Liveness gate: a stop() issued during the delay wins
                    if self.live() {
                        // The old session must be fully stopped before a
                        // new start; two live sessions would interleave
                        // duplicate event streams into the buffer
                        self.session.stop();
                        if let Err(e) = self.session.start(events_tx.clone()) {
                            self.reporter.report(
                                "recognition",
                                &TaskError::Recoverable(format!("session restart failed: {}", e)),
                            );
                            restart_at = Some(Instant::now() + self.error_restart_delay);
                        }
                    }
                }
            }
        }

        self.session.stop();
    }

    /// Merges one batch of recognition results into the buffer.
    ///
    /// The results slice is the session's result list; entries below
    /// `result_index` are already committed and must not be re-applied.
    fn handle_results(&mut self, result_index: usize, results: &[RecognitionResult]) {
        for result in results.iter().skip(result_index) {
            let text = result.text.trim();
            if text.is_empty() {
                continue;
            }

            let level = self.probe.level_of(SourceKind::Remote);
            let now = self.clock.now();

            let speaker = match self.shared.identifier.lock() {
                Ok(mut identifier) => identifier.identify(level, now),
                Err(_) => None,
            };
            let (speaker_id, speaker_name) = match speaker {
                Some(identity) => (identity.id, identity.name),
                None => ("unknown".to_string(), "Unknown".to_string()),
            };

            let draft = EntryDraft {
                timestamp: now,
                speaker: speaker_name,
                speaker_id,
                text: text.to_string(),
                confidence: result.confidence,
                audio_level: level,
            };

            let snapshot = match self.shared.buffer.lock() {
                Ok(mut buffer) => {
                    if result.is_final {
                        buffer.push_final(draft);
                    } else {
                        buffer.upsert_interim(draft);
                    }
                    buffer.snapshot()
                }
                Err(_) => continue,
            };

            // Snapshot clone handed out with no locks held
            let subscriber = self
                .shared
                .subscriber
                .lock()
                .ok()
                .and_then(|s| s.clone());
            if let Some(callback) = subscriber {
                callback(&snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{MockCaptureProvider, MockCaptureSource};
    use crate::recognition::session::MockRecognitionEngine;

    fn loud_provider() -> MockCaptureProvider {
        MockCaptureProvider::with_sources(vec![
            MockCaptureSource::new().with_repeating_samples(vec![0i16; 64]),
            MockCaptureSource::new().with_repeating_samples(vec![8000i16; 64]),
        ])
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            mixer: MixerConfig {
                mix_interval: Duration::from_millis(5),
                level_window: 64,
                ..MixerConfig::default()
            },
            error_restart_delay: Duration::from_millis(50),
            end_restart_delay: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_unsupported_platform() {
        let engine = Arc::new(MockRecognitionEngine::unsupported());
        let provider = Arc::new(MockCaptureProvider::new());
        let mut orchestrator = TranscriptionOrchestrator::new(engine, provider);

        let err = orchestrator.initialize(None).await.unwrap_err();
        assert!(matches!(err, MeetscribeError::UnsupportedPlatform));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_initialize_wraps_mixer_failure() {
        let engine = Arc::new(MockRecognitionEngine::new());
        let provider = Arc::new(MockCaptureProvider::denying_permission());
        let mut orchestrator = TranscriptionOrchestrator::new(engine, provider);

        let err = orchestrator.initialize(None).await.unwrap_err();
        match err {
            MeetscribeError::InitializationFailed { source } => {
                assert!(matches!(*source, MeetscribeError::PermissionDenied { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn test_start_before_initialize_is_an_error() {
        let engine = Arc::new(MockRecognitionEngine::new());
        let provider = Arc::new(MockCaptureProvider::new());
        let mut orchestrator = TranscriptionOrchestrator::new(engine, provider);

        assert!(matches!(
            orchestrator.start(),
            Err(MeetscribeError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let engine = Arc::new(MockRecognitionEngine::new());
        let handle = engine.handle();
        let provider = Arc::new(loud_provider());
        let mut orchestrator =
            TranscriptionOrchestrator::new(engine, provider).with_config(fast_config());

        orchestrator.initialize(None).await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);

        orchestrator.start().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Active);
        assert!(orchestrator.is_active());

        // start while active is a no-op
        orchestrator.start().unwrap();

        orchestrator.stop();
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
        assert!(!orchestrator.is_active());
        assert!(!handle.has_live_session());

        // restart from Stopped
        orchestrator.start().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Active);

        orchestrator.cleanup();
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        orchestrator.cleanup();
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_builders_chain() {
        let engine = Arc::new(MockRecognitionEngine::new());
        let provider = Arc::new(loud_provider());
        let reporter = Arc::new(crate::report::CollectingReporter::new());
        let clock = Arc::new(crate::clock::MockClock::new());
        let extractor = Arc::new(crate::speaker::registry::SimulatedExtractor::new(Vec::new()));

        let mut orchestrator = TranscriptionOrchestrator::new(engine, provider)
            .with_clock(clock)
            .with_error_reporter(reporter)
            .with_extractor(extractor)
            .with_config(fast_config());

        orchestrator.initialize(None).await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
        assert_eq!(
            orchestrator.config.error_restart_delay,
            Duration::from_millis(50)
        );
        orchestrator.cleanup();
    }

    #[test]
    fn test_from_config_mapping() {
        let mut config = Config::default();
        config.speaker.speaking_threshold = 0.2;
        config.recognition.error_restart_delay_ms = 750;

        let tuned = OrchestratorConfig::from_config(&config);
        assert!((tuned.speaking_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(tuned.error_restart_delay, Duration::from_millis(750));
        assert!((tuned.mixer.remote_gain - 1.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_adjust_audio_levels_clamped() {
        let engine = Arc::new(MockRecognitionEngine::new());
        let provider = Arc::new(MockCaptureProvider::new());
        let mut orchestrator =
            TranscriptionOrchestrator::new(engine, provider).with_config(fast_config());

        orchestrator.initialize(None).await.unwrap();
        orchestrator.adjust_audio_levels(5.0, -2.0);

        let mixer = orchestrator.mixer.as_ref().unwrap();
        assert!((mixer.gain(SourceKind::Local) - 3.0).abs() < f32::EPSILON);
        assert_eq!(mixer.gain(SourceKind::Remote), 0.0);
        orchestrator.cleanup();
    }
}

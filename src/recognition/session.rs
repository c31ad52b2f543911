//! Continuous speech-recognition session contract.
//!
//! This crate does not bind a recognition vendor; it specifies the
//! orchestration contract around an abstract continuous-recognition
//! capability. A session emits partial/final results, transient errors and
//! end-of-stream signals through a channel; the contract assumes sessions
//! may end spontaneously even without error and must be relaunched to stay
//! continuous.

use crate::error::{MeetscribeError, Result};
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One recognized alternative for an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    /// Recognizer confidence in [0, 1].
    pub confidence: f32,
    /// True once the recognizer has committed this text.
    pub is_final: bool,
}

/// Transient error kinds a session may raise.
///
/// All of these are absorbed by the orchestrator; none are surfaced to
/// callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// No speech was detected within the engine's window.
    NoSpeech,
    /// Network connectivity hiccup.
    Network,
    /// The engine lost its audio input.
    AudioLost,
    /// The session was aborted by the engine.
    Aborted,
    /// Engine-specific error.
    Other(String),
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionErrorKind::NoSpeech => write!(f, "no-speech"),
            RecognitionErrorKind::Network => write!(f, "network"),
            RecognitionErrorKind::AudioLost => write!(f, "audio-lost"),
            RecognitionErrorKind::Aborted => write!(f, "aborted"),
            RecognitionErrorKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Event emitted by a recognition session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session's result list. Entries below `result_index` were
    /// delivered before and are unchanged; consumers apply from
    /// `result_index` onward.
    Results {
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    /// A transient error; the session is dead and needs a restart.
    Error(RecognitionErrorKind),
    /// The session ended, possibly without any error.
    Ended,
}

/// A single continuous recognition session.
///
/// `start` hands the session the channel it must emit events on. `stop` is
/// synchronous: when it returns, the session emits no further events, which
/// is what makes back-to-back stop/start sequences safe.
pub trait RecognitionSession: Send {
    /// Starts the session, emitting events on the given channel.
    fn start(&mut self, events: Sender<SessionEvent>) -> Result<()>;

    /// Stops the session. Idempotent.
    fn stop(&mut self);
}

/// Factory for recognition sessions.
pub trait RecognitionEngine: Send + Sync {
    /// Creates a session, or fails with `UnsupportedPlatform` when no
    /// continuous-recognition capability exists at all.
    fn create_session(&self) -> Result<Box<dyn RecognitionSession>>;
}

struct MockEngineInner {
    sessions_created: AtomicUsize,
    stops: AtomicUsize,
    /// Remaining start() calls that should fail before starts succeed.
    failing_starts: AtomicUsize,
    active_tx: Mutex<Option<Sender<SessionEvent>>>,
    unsupported: bool,
}

/// Scriptable mock recognition engine for testing.
///
/// Tests keep a [`MockEngineHandle`] to inject events into whichever
/// session is currently live and to observe session churn across restarts.
pub struct MockRecognitionEngine {
    inner: Arc<MockEngineInner>,
}

impl MockRecognitionEngine {
    /// Engine that grants sessions normally.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockEngineInner {
                sessions_created: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                failing_starts: AtomicUsize::new(0),
                active_tx: Mutex::new(None),
                unsupported: false,
            }),
        }
    }

    /// Engine with no recognition capability at all.
    pub fn unsupported() -> Self {
        Self {
            inner: Arc::new(MockEngineInner {
                sessions_created: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                failing_starts: AtomicUsize::new(0),
                active_tx: Mutex::new(None),
                unsupported: true,
            }),
        }
    }

    /// Engine whose next `count` session starts fail with a
    /// `Recognition` error before starts begin succeeding.
    pub fn with_failing_starts(self, count: usize) -> Self {
        self.inner.failing_starts.store(count, Ordering::SeqCst);
        self
    }

    /// Returns a handle for driving the engine from a test.
    pub fn handle(&self) -> MockEngineHandle {
        MockEngineHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MockRecognitionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine for MockRecognitionEngine {
    fn create_session(&self) -> Result<Box<dyn RecognitionSession>> {
        if self.inner.unsupported {
            return Err(MeetscribeError::UnsupportedPlatform);
        }
        self.inner.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRecognitionSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// Test-side handle into a [`MockRecognitionEngine`].
#[derive(Clone)]
pub struct MockEngineHandle {
    inner: Arc<MockEngineInner>,
}

impl MockEngineHandle {
    /// Emits an event from the currently live session.
    ///
    /// Returns false when no session is live.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let guard = match self.inner.active_tx.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        match guard.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Convenience: emits a single-result event.
    pub fn emit_result(&self, text: &str, confidence: f32, is_final: bool) -> bool {
        self.emit(SessionEvent::Results {
            result_index: 0,
            results: vec![RecognitionResult {
                text: text.to_string(),
                confidence,
                is_final,
            }],
        })
    }

    /// Total sessions created so far.
    pub fn sessions_created(&self) -> usize {
        self.inner.sessions_created.load(Ordering::SeqCst)
    }

    /// Total stop() calls observed so far.
    pub fn stops(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    /// True while some session is started and not yet stopped.
    pub fn has_live_session(&self) -> bool {
        self.inner
            .active_tx
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

struct MockRecognitionSession {
    inner: Arc<MockEngineInner>,
}

impl RecognitionSession for MockRecognitionSession {
    fn start(&mut self, events: Sender<SessionEvent>) -> Result<()> {
        if self
            .inner
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(MeetscribeError::Recognition {
                message: "simulated session start failure".to_string(),
            });
        }
        if let Ok(mut active) = self.inner.active_tx.lock() {
            *active = Some(events);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut active) = self.inner.active_tx.lock() {
            *active = None;
        }
    }
}

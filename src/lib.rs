//! meetscribe - Real-time meeting transcription core
//!
//! Dual-source audio mixing, speaker attribution and self-healing
//! continuous speech recognition behind pluggable capture and engine
//! traits.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod recognition;
pub mod report;
pub mod speaker;
pub mod transcript;

// Core traits (capture → recognize → transcript)
pub use audio::source::{CaptureConstraints, CaptureProvider, CaptureSource, SourceKind};
pub use recognition::session::{
    RecognitionEngine, RecognitionErrorKind, RecognitionResult, RecognitionSession, SessionEvent,
};
pub use speaker::registry::{FrameSample, FrameSource, FrameToCandidates, NameCandidate};

// Pipeline
pub use audio::mixer::{AudioMixer, LevelProbe, MixedFrame, MixerConfig};
pub use recognition::orchestrator::{
    OrchestratorConfig, OrchestratorState, TranscriptionOrchestrator,
};
pub use speaker::identifier::{SpeakerIdentifier, SpeakerIdentity, SpeakerStats};
pub use speaker::registry::{NameCandidateRegistry, SpeakerCandidate};
pub use transcript::{TranscriptBuffer, TranscriptionEntry};

// Error handling
pub use error::{MeetscribeError, Result};
pub use report::{ErrorReporter, LogReporter, TaskError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"`
/// otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

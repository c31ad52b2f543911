//! Default tuning constants for meetscribe.
//!
//! Shared across configuration types and component defaults so the numbers
//! live in exactly one place.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and keeps the analysis
/// windows small enough for low-latency level metering.
pub const SAMPLE_RATE: u32 = 16000;

/// Default gain applied to the local (microphone) source.
pub const LOCAL_GAIN: f32 = 1.0;

/// Default gain applied to the remote (system/meeting) source.
///
/// Remote audio typically arrives attenuated compared to a close microphone,
/// so it gets a modest boost by default.
pub const REMOTE_GAIN: f32 = 1.3;

/// Maximum gain for either source. Values above this saturate.
pub const MAX_GAIN: f32 = 3.0;

/// Interval between mixer pump ticks in milliseconds.
///
/// Each tick drains both capture sources, updates the level meters and
/// emits one mixed frame.
pub const MIX_INTERVAL_MS: u64 = 100;

/// Capacity of the mixed-frame output channel, in frames.
///
/// When the consumer falls behind, new frames are dropped rather than
/// blocking the pump.
pub const MIXED_FRAME_BUFFER: usize = 32;

/// Number of samples in the level-meter analysis window.
///
/// ~128ms at 16kHz, enough to smooth single-sample spikes while staying
/// responsive to speech onsets.
pub const LEVEL_WINDOW_SAMPLES: usize = 2048;

/// RMS level above which a sample window counts as speech (0.0 to 1.0).
pub const SPEAKING_THRESHOLD: f32 = 0.1;

/// Minimum elapsed time before the identifier may switch speakers based on
/// timing alone, in milliseconds.
pub const SWITCH_COOLDOWN_MS: u64 = 1000;

/// Floor for the switch cooldown. Lower values cause speaker flapping on
/// audio jitter.
pub const MIN_SWITCH_COOLDOWN_MS: u64 = 500;

/// Gap after which a new activity record is written for the same speaker,
/// in milliseconds.
pub const ACTIVITY_GAP_MS: u64 = 2000;

/// Maximum number of activity-history records kept.
pub const ACTIVITY_HISTORY_CAP: usize = 50;

/// Number of records retained after the history cap is exceeded.
pub const ACTIVITY_HISTORY_KEEP: usize = 25;

/// Number of most recent activity records consulted by the round-robin
/// speaker selection.
pub const RECENT_SPEAKER_WINDOW: usize = 10;

/// Interval between name-candidate sampling ticks, in milliseconds.
pub const SCAN_INTERVAL_MS: u64 = 2000;

/// Delay before restarting a recognition session after a transient error,
/// in milliseconds.
pub const ERROR_RESTART_DELAY_MS: u64 = 1000;

/// Delay before relaunching a recognition session after a spontaneous
/// end-of-stream, in milliseconds. Continuous sessions end periodically by
/// design, so the relaunch is near-immediate.
pub const END_RESTART_DELAY_MS: u64 = 100;

/// Capacity of the recognition event channel, in events.
pub const EVENT_BUFFER: usize = 64;

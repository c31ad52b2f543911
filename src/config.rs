use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub speaker: SpeakerConfig,
    pub recognition: RecognitionConfig,
}

/// Audio capture and mixing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Optional local input device name; None selects the system default.
    pub local_device: Option<String>,
    /// Optional remote/system capture device name.
    pub remote_device: Option<String>,
    pub sample_rate: u32,
    pub local_gain: f32,
    pub remote_gain: f32,
}

/// Speaker attribution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeakerConfig {
    pub speaking_threshold: f32,
    pub switch_cooldown_ms: u64,
    pub scan_interval_ms: u64,
}

/// Recognition session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub error_restart_delay_ms: u64,
    pub end_restart_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            local_device: None,
            remote_device: None,
            sample_rate: defaults::SAMPLE_RATE,
            local_gain: defaults::LOCAL_GAIN,
            remote_gain: defaults::REMOTE_GAIN,
        }
    }
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            speaking_threshold: defaults::SPEAKING_THRESHOLD,
            switch_cooldown_ms: defaults::SWITCH_COOLDOWN_MS,
            scan_interval_ms: defaults::SCAN_INTERVAL_MS,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            error_restart_delay_ms: defaults::ERROR_RESTART_DELAY_MS,
            end_restart_delay_ms: defaults::END_RESTART_DELAY_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file is
    /// missing. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                let missing = e
                    .downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false);
                if missing { Ok(Self::default()) } else { Err(e) }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - MEETSCRIBE_LOCAL_DEVICE → audio.local_device
    /// - MEETSCRIBE_REMOTE_DEVICE → audio.remote_device
    /// - MEETSCRIBE_SPEAKING_THRESHOLD → speaker.speaking_threshold
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("MEETSCRIBE_LOCAL_DEVICE") {
            if !device.is_empty() {
                self.audio.local_device = Some(device);
            }
        }
        if let Ok(device) = std::env::var("MEETSCRIBE_REMOTE_DEVICE") {
            if !device.is_empty() {
                self.audio.remote_device = Some(device);
            }
        }
        if let Ok(threshold) = std::env::var("MEETSCRIBE_SPEAKING_THRESHOLD") {
            if let Ok(value) = threshold.parse::<f32>() {
                self.speaker.speaking_threshold = value.clamp(0.0, 1.0);
            }
        }
        self
    }
}

//! Error types for meetscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeetscribeError {
    // Device acquisition errors — each maps to a distinct user-actionable cause
    #[error("Permission denied for {kind} audio capture: {message}")]
    PermissionDenied { kind: String, message: String },

    #[error("Audio device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported capture capability: {capability}")]
    UnsupportedCapability { capability: String },

    // Audio runtime errors
    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Recognition errors
    #[error("No continuous speech recognition capability is available on this platform")]
    UnsupportedPlatform,

    #[error("Recognition session error: {message}")]
    Recognition { message: String },

    // Orchestrator lifecycle errors
    #[error("Transcription setup failed: {source}")]
    InitializationFailed {
        #[source]
        source: Box<MeetscribeError>,
    },

    #[error("Orchestrator is not initialized; call initialize() first")]
    NotInitialized,

    // Name extraction errors
    #[error("Frame extraction failed: {message}")]
    FrameExtraction { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeetscribeError {
    /// Wraps a setup failure into `InitializationFailed`, preserving the
    /// underlying cause for display.
    pub fn into_init_failure(self) -> Self {
        MeetscribeError::InitializationFailed {
            source: Box::new(self),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, MeetscribeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_permission_denied_display() {
        let error = MeetscribeError::PermissionDenied {
            kind: "local".to_string(),
            message: "microphone access was dismissed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Permission denied for local audio capture: microphone access was dismissed"
        );
    }

    #[test]
    fn test_device_not_found_display() {
        let error = MeetscribeError::DeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_unsupported_capability_display() {
        let error = MeetscribeError::UnsupportedCapability {
            capability: "16kHz mono capture".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported capture capability: 16kHz mono capture"
        );
    }

    #[test]
    fn test_unsupported_platform_display() {
        let error = MeetscribeError::UnsupportedPlatform;
        assert_eq!(
            error.to_string(),
            "No continuous speech recognition capability is available on this platform"
        );
    }

    #[test]
    fn test_initialization_failed_preserves_cause() {
        let cause = MeetscribeError::DeviceNotFound {
            device: "monitor".to_string(),
        };
        let error = cause.into_init_failure();
        assert_eq!(
            error.to_string(),
            "Transcription setup failed: Audio device not found: monitor"
        );

        // The original cause stays reachable through the source chain
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_recognition_display() {
        let error = MeetscribeError::Recognition {
            message: "session refused to start".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Recognition session error: session refused to start"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: MeetscribeError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: MeetscribeError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<MeetscribeError>();
        assert_sync::<MeetscribeError>();
    }
}

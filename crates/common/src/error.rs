//! Error types shared across Mosaic crates.

/// Top-level error type for Mosaic operations.
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("A recording session is already running")]
    AlreadyRunning,

    #[error("No recording session is running")]
    NotRunning,

    #[error("Compose error in section {index}: {message}")]
    Compose { index: usize, message: String },

    #[error("Audio acquisition failed: {message}")]
    AudioAcquisition { message: String },

    #[error("Encoder initialization failed: {message}")]
    EncoderInit { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Encoder is not configured (state: {state})")]
    EncoderNotConfigured { state: String },

    #[error("Mux error: {message}")]
    Mux { message: String },

    #[error("No video frames were muxed; refusing to write an empty recording")]
    NoVideoFrames,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MosaicError.
pub type MosaicResult<T> = Result<T, MosaicError>;

impl MosaicError {
    pub fn compose(index: usize, msg: impl Into<String>) -> Self {
        Self::Compose {
            index,
            message: msg.into(),
        }
    }

    pub fn audio_acquisition(msg: impl Into<String>) -> Self {
        Self::AudioAcquisition {
            message: msg.into(),
        }
    }

    pub fn encoder_init(msg: impl Into<String>) -> Self {
        Self::EncoderInit {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error ends the session rather than degrading it.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoVideoFrames | Self::Mux { .. } | Self::Io(_) | Self::EncoderInit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_surfaced_verbatim() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk is read-only");
        let err = MosaicError::from(io);
        assert_eq!(err.to_string(), "disk is read-only");
        assert!(err.is_session_fatal());
    }

    #[test]
    fn degradations_are_not_session_fatal() {
        assert!(!MosaicError::compose(2, "bad buffer").is_session_fatal());
        assert!(!MosaicError::audio_acquisition("mic denied").is_session_fatal());
        assert!(!MosaicError::encode("encoder crashed").is_session_fatal());
        assert!(MosaicError::NoVideoFrames.is_session_fatal());
    }
}

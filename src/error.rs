//! Error types shared across the client.
//!
//! The `Display` text of [`InputError`] is what the user sees; the other
//! enums carry technical detail for the logs and map to fixed notices in the
//! workflow controller.

use thiserror::Error;

/// Problems with what the user supplied. Reported immediately, no state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Please choose an image file (jpg, png, heic).")]
    NotAnImage { mime: String },
    #[error("Image is too large. Keep it under {}MB.", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },
    #[error("Could not read that image. Try another file.")]
    Unreadable(String),
    #[error("Choose or capture a photo first.")]
    NoImage,
    #[error("Type a few words about your mood first.")]
    EmptyMood,
}

/// Camera acquisition or capture failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    NoDevice,
    #[error("camera is in use by another application")]
    Busy,
    #[error("camera capture is not supported on this platform")]
    Unsupported,
    #[error("camera has not produced a frame yet")]
    NotReady,
    #[error("no camera session is active")]
    NoSession,
    #[error("camera error: {0}")]
    Other(String),
}

/// Failures talking to the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    /// The service answered with an `error` field.
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Message supplied by the service itself, if any.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected(message) if !message.trim().is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_message_uses_limit() {
        let err = InputError::TooLarge { size: 6 * 1024 * 1024, limit: 5 * 1024 * 1024 };
        assert_eq!(err.to_string(), "Image is too large. Keep it under 5MB.");
    }

    #[test]
    fn test_service_message_only_for_rejections() {
        assert_eq!(
            ServiceError::Rejected("no face detected".into()).service_message(),
            Some("no face detected")
        );
        assert_eq!(ServiceError::Rejected("  ".into()).service_message(), None);
        assert_eq!(ServiceError::Status(502).service_message(), None);
        assert_eq!(ServiceError::Transport("timeout".into()).service_message(), None);
    }
}

//! Error taxonomy for perception sessions.
//!
//! Only [`SessionError::StartupFatal`] and [`SessionError::TransportFailure`] end a
//! session. Everything else is isolated to the message that caused it.

use thiserror::Error;

/// Failure to turn a data-URL text frame into pixels.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// No model asset or no initial backend; the channel is closed after reporting it
    #[error("startup failed: {0}")]
    StartupFatal(String),

    /// Control message that was not valid JSON; dropped without a reply
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Decode or inference failure on a single frame
    #[error("frame failed: {0}")]
    FrameFailure(String),

    /// New backend could not be constructed; the previous configuration stays active
    #[error("reconfiguration failed: {0}")]
    ReconfigureFailure(String),

    #[error("transport failed: {0}")]
    TransportFailure(String),
}

impl SessionError {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::StartupFatal(_) | SessionError::TransportFailure(_)
        )
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        SessionError::FrameFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_startup_and_transport_are_terminal() {
        assert!(SessionError::StartupFatal("no asset".into()).is_terminal());
        assert!(SessionError::TransportFailure("closed".into()).is_terminal());
        assert!(!SessionError::MalformedMessage("{".into()).is_terminal());
        assert!(!SessionError::FrameFailure("decode".into()).is_terminal());
        assert!(!SessionError::ReconfigureFailure("gpu".into()).is_terminal());
    }

    #[test]
    fn test_frame_error_maps_to_frame_failure() {
        let err: SessionError = FrameError::MalformedFrame("no comma".into()).into();
        assert!(matches!(err, SessionError::FrameFailure(_)));
        assert!(err.to_string().contains("no comma"));
    }
}

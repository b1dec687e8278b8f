//! Error kinds surfaced by a relay session
//!
//! Every terminal error maps to a WebSocket close code so the client can
//! tell an engine failure apart from a normal close.

use thiserror::Error;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Policy violation: the client config was rejected, locally or by the engine.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Internal error: the recognition engine failed mid-stream.
pub const CLOSE_ENGINE_ERROR: u16 = 1011;
/// Try again later: the engine could not keep up with the audio.
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Client configuration failed local validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The recognition engine refused the request at open time
    #[error("Recognition engine rejected the request: {0}")]
    EngineRejected(String),

    /// The recognition engine failed after the stream was open
    #[error("Recognition engine error: {0}")]
    EngineStreamError(String),

    /// The client connection failed or dropped
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The engine write buffer stayed full past the write timeout
    #[error("Recognition buffer exhausted: {0}")]
    ResourceExhausted(String),

    /// A control frame could not be parsed
    #[error("Malformed message: {0}")]
    Protocol(String),
}

impl RelayError {
    /// Machine-readable code used in `{"type":"error"}` replies.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidConfig(_) => "invalid_config",
            RelayError::EngineRejected(_) => "engine_rejected",
            RelayError::EngineStreamError(_) => "engine_error",
            RelayError::TransportError(_) => "transport_error",
            RelayError::ResourceExhausted(_) => "resource_exhausted",
            RelayError::Protocol(_) => "malformed_message",
        }
    }

    /// Close code sent to the client when this error ends the session.
    pub fn close_code(&self) -> u16 {
        match self {
            RelayError::InvalidConfig(_) | RelayError::EngineRejected(_) => CLOSE_POLICY_VIOLATION,
            RelayError::EngineStreamError(_) => CLOSE_ENGINE_ERROR,
            RelayError::ResourceExhausted(_) => CLOSE_TRY_AGAIN_LATER,
            RelayError::TransportError(_) | RelayError::Protocol(_) => CLOSE_NORMAL,
        }
    }

    /// Short close reason. WebSocket close reasons are capped at 123 bytes,
    /// so the detailed message travels in the preceding error reply instead.
    pub fn close_reason(&self) -> &'static str {
        match self {
            RelayError::InvalidConfig(_) => "Invalid config",
            RelayError::EngineRejected(_) => "Recognition request rejected",
            RelayError::EngineStreamError(_) => "Recognition engine error",
            RelayError::TransportError(_) => "Transport error",
            RelayError::ResourceExhausted(_) => "Recognition buffer full",
            RelayError::Protocol(_) => "Malformed message",
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_share_policy_close() {
        let invalid = RelayError::InvalidConfig("bad language".into());
        let rejected = RelayError::EngineRejected("INVALID_ARGUMENT".into());
        assert_eq!(invalid.close_code(), CLOSE_POLICY_VIOLATION);
        assert_eq!(rejected.close_code(), CLOSE_POLICY_VIOLATION);
    }

    #[test]
    fn test_engine_error_is_distinct_from_normal_close() {
        let err = RelayError::EngineStreamError("stream reset".into());
        assert_eq!(err.close_code(), CLOSE_ENGINE_ERROR);
        assert_ne!(err.close_code(), CLOSE_NORMAL);
        assert_eq!(err.code(), "engine_error");
        assert_eq!(err.to_string(), "Recognition engine error: stream reset");
    }

    #[test]
    fn test_close_reasons_fit_in_a_close_frame() {
        let errors = [
            RelayError::InvalidConfig(String::new()),
            RelayError::EngineRejected(String::new()),
            RelayError::EngineStreamError(String::new()),
            RelayError::TransportError(String::new()),
            RelayError::ResourceExhausted(String::new()),
            RelayError::Protocol(String::new()),
        ];
        for err in errors {
            assert!(err.close_reason().len() <= 123);
        }
    }
}

use serde::Serialize;
use std::fmt;

/// Lifecycle of a relay session
///
/// ```text
/// Unconfigured --config ok--> Streaming --engine error--> Closing --client close--> Closed
///      |                          |                          ^
///      +--bad config--------------|--------------------------+
///      +--client close--> Closed  +--client close--> Closed (handle released)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the config message; audio is dropped
    Unconfigured,
    /// Recognition stream open; audio flows to the engine
    Streaming,
    /// Tearing down; the close has been sent and input is ignored
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    /// Whether inbound client messages are still acted on
    pub fn accepts_input(self) -> bool {
        matches!(self, SessionState::Unconfigured | SessionState::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

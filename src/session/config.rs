use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::recognition::RecognitionPolicy;

/// Per-session settings, shared read-only across all sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rules for turning a client config into an engine request
    pub policy: Arc<RecognitionPolicy>,

    /// Sniff payloads instead of trusting the frame type
    pub permissive_parsing: bool,

    /// How long a closing session waits for the client to acknowledge the
    /// close before giving up on it
    pub close_grace: Duration,
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            policy: Arc::new(RecognitionPolicy::from(&cfg.recognition)),
            permissive_parsing: cfg.protocol.permissive_parsing,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: Arc::new(RecognitionPolicy::default()),
            permissive_parsing: false,
            close_grace: Duration::from_secs(5),
        }
    }
}

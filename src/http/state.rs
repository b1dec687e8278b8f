use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::recognition::RecognitionEngine;
use crate::session::SessionConfig;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Recognition backend shared by every session
    pub engine: Arc<dyn RecognitionEngine>,

    pub session_config: SessionConfig,

    pub service_name: String,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,

    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(engine: Arc<dyn RecognitionEngine>, cfg: &Config) -> Self {
        Self {
            engine,
            session_config: SessionConfig::from_config(cfg),
            service_name: cfg.service.name.clone(),
            max_sessions: cfg.service.max_sessions,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// Reserve a session slot, or `None` when the limit is reached.
    pub fn try_acquire_session(&self) -> Option<SessionGuard> {
        let limit = self.max_sessions;
        self.active_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (limit == 0 || n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| SessionGuard {
                counter: Arc::clone(&self.active_sessions),
            })
    }
}

/// Holds one slot of the session limit; released on drop
pub struct SessionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

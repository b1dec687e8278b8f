use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionState;

/// Counters for one relay session, logged when it ends
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    /// When the client connected
    pub started_at: DateTime<Utc>,

    /// State when the stats were taken
    pub state: SessionState,

    /// Audio chunks written to the engine
    pub audio_chunks_forwarded: u64,

    /// Bytes of PCM written to the engine
    pub audio_bytes_forwarded: u64,

    /// Audio chunks discarded because no stream was open
    pub audio_chunks_dropped: u64,

    pub interim_transcripts: u64,
    pub final_transcripts: u64,

    /// Times the recognition handle was released (0 or 1)
    pub handle_releases: u32,

    /// Error code that ended the session, if any
    pub close_error: Option<String>,
}

impl SessionStats {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            state: SessionState::Unconfigured,
            audio_chunks_forwarded: 0,
            audio_bytes_forwarded: 0,
            audio_chunks_dropped: 0,
            interim_transcripts: 0,
            final_transcripts: 0,
            handle_releases: 0,
            close_error: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds() as f64
            / 1000.0
    }
}

use tokio::sync::mpsc;

use super::request::RecognitionRequest;
use crate::error::{RelayError, RelayResult};

/// A transcript produced by the engine, forwarded to the client verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    /// Final results will not be revised; interim results may be superseded
    pub is_final: bool,
}

/// Output of an open recognition stream, in engine emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Transcript(TranscriptEvent),
    /// Terminal failure; delivered at most once, after which the channel closes
    Error(RelayError),
}

/// An open recognition stream: the write side plus its ordered event feed.
///
/// The event receiver closing without an `Error` means the engine ended the
/// stream on its own.
pub struct RecognitionChannel {
    pub handle: Box<dyn RecognitionHandle>,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Write side of a recognition stream, exclusively owned by one session
#[async_trait::async_trait]
pub trait RecognitionHandle: Send + Sync {
    /// Queue raw audio for the engine.
    ///
    /// A terminated or ended handle swallows the write and returns `Ok`.
    /// Returns `ResourceExhausted` when the buffer stays full past the
    /// configured write timeout.
    async fn write(&mut self, audio: Vec<u8>) -> RelayResult<()>;

    /// Signal that no more audio follows so the engine can flush final
    /// results. Never blocks; safe to call more than once.
    fn end(&mut self);

    /// Whether the engine side has closed or failed
    fn is_terminated(&self) -> bool;
}

/// Streaming recognition backend
///
/// Implementations:
/// - `WebSocketEngine`: duplex JSON stream to a remote engine
#[async_trait::async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Open a duplex recognition stream for one session.
    ///
    /// Fails with `EngineRejected` if the engine refuses the request or does
    /// not acknowledge it in time; no handle is returned in that case.
    async fn open(&self, session_id: &str, request: &RecognitionRequest) -> RelayResult<RecognitionChannel>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

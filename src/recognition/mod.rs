//! Recognition channel adapter
//!
//! Translates a session's config into an engine request, opens one duplex
//! stream per session and turns engine output back into transcript events
//! and terminal errors.

mod engine;
pub mod messages;
mod request;
mod websocket;

pub use engine::{EngineEvent, RecognitionChannel, RecognitionEngine, RecognitionHandle, TranscriptEvent};
pub use request::{RecognitionPolicy, RecognitionRequest};
pub use websocket::{WebSocketEngine, WebSocketHandle};

pub mod config;
pub mod error;
pub mod http;
pub mod keepalive;
pub mod protocol;
pub mod recognition;
pub mod session;

pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use http::{create_router, AppState};
pub use protocol::{ClientConfig, InboundFrame, ServerMessage};
pub use recognition::{
    EngineEvent, RecognitionChannel, RecognitionEngine, RecognitionHandle, RecognitionPolicy,
    RecognitionRequest, TranscriptEvent, WebSocketEngine,
};
pub use session::{Outbound, Session, SessionConfig, SessionState, SessionStats, TransportEvent};

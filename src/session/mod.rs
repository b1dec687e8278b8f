//! Per-connection relay session
//!
//! This module provides the `Session` state machine that:
//! - Dispatches inbound client frames (config vs. audio)
//! - Opens and owns the recognition stream
//! - Forwards transcripts back to the client in engine order
//! - Releases the recognition stream exactly once on any termination path

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::{Outbound, Session, TransportEvent};
pub use state::SessionState;
pub use stats::SessionStats;

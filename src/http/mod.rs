//! HTTP and WebSocket front end
//!
//! - GET / and GET /ws - Upgrade to a relay session
//! - GET /health - Health check with active session count
//! - GET /keep-alive - Plain-text liveness check used by the self-ping

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, SessionGuard};

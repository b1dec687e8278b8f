use super::state::{AppState, SessionGuard};
use crate::protocol::InboundFrame;
use crate::session::{Outbound, Session, TransportEvent};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Client frames queued towards the session. The reader stops pulling from
/// the socket when this is full, which pushes back on the client.
const INBOUND_BUFFER: usize = 64;

/// Replies queued towards the client
const OUTBOUND_BUFFER: usize = 64;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / and GET /ws
/// Upgrade to a relay session
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(guard) = state.try_acquire_session() else {
        warn!(
            max_sessions = state.max_sessions,
            "Session limit reached, refusing connection"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Too many active sessions".to_string(),
            }),
        )
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, guard))
}

/// Pump one client socket through a `Session` until it closes.
async fn handle_socket(socket: WebSocket, state: AppState, _guard: SessionGuard) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(
        session_id = %session_id,
        active_sessions = state.active_sessions(),
        "Client connected"
    );

    let (mut sink, mut stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(INBOUND_BUFFER);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);

    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let event = match msg {
                Ok(Message::Text(text)) => TransportEvent::Frame(InboundFrame::Text(text)),
                Ok(Message::Binary(data)) => TransportEvent::Frame(InboundFrame::Binary(data)),
                Ok(Message::Close(_)) => break,
                // Pings are answered by axum
                Ok(_) => continue,
                Err(e) => {
                    let _ = inbound_tx.send(TransportEvent::Failed(e.to_string())).await;
                    return;
                }
            };

            if inbound_tx.send(event).await.is_err() {
                return;
            }
        }
        let _ = inbound_tx.send(TransportEvent::Closed).await;
    });

    let writer_id = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Message(message) => {
                    if sink.send(Message::Text(message.to_json())).await.is_err() {
                        debug!(session_id = %writer_id, "Client write failed");
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let session = Session::new(
        session_id.clone(),
        state.session_config.clone(),
        state.engine.clone(),
        outbound_tx,
    );
    let stats = session.run(inbound_rx).await;

    // The session owned the only outbound sender, so the writer drains and exits.
    let _ = writer.await;
    reader.abort();

    debug!(session_id = %session_id, stats = ?stats, "Connection finished");
}

/// GET /keep-alive
/// Liveness check hit by the self-ping
pub async fn keep_alive() -> impl IntoResponse {
    (StatusCode::OK, "Server is awake!")
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            service: state.service_name.clone(),
            active_sessions: state.active_sessions(),
        }),
    )
}

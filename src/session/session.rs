use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{classify, ClientConfig, Inbound, InboundFrame, ServerMessage};
use crate::recognition::{
    EngineEvent, RecognitionEngine, RecognitionHandle, RecognitionRequest, TranscriptEvent,
};

/// What the transport reports about the client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(InboundFrame),
    /// The client closed the connection
    Closed,
    /// The connection failed or dropped
    Failed(String),
}

/// What the session asks the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Close the connection; nothing is sent after this
    Close { code: u16, reason: String },
}

/// Everything that can drive a state transition, serialized into one queue
#[derive(Debug)]
enum SessionEvent {
    Transport(TransportEvent),
    Engine(EngineEvent),
    /// The engine event feed closed without an error
    EngineEnded,
    /// The client did not finish the close handshake in time
    CloseTimeout,
}

/// A relay session bound to one client connection
pub struct Session {
    id: String,
    state: SessionState,
    config: SessionConfig,
    engine: Arc<dyn RecognitionEngine>,

    /// Set once, from the first valid config message
    request: Option<RecognitionRequest>,

    /// Open recognition stream; `None` before config and after release
    handle: Option<Box<dyn RecognitionHandle>>,
    engine_events: Option<mpsc::Receiver<EngineEvent>>,

    outbound: mpsc::Sender<Outbound>,

    /// Deadline for the client to acknowledge our close
    closing_deadline: Option<Instant>,

    stats: SessionStats,
}

impl Session {
    pub fn new(
        id: String,
        config: SessionConfig,
        engine: Arc<dyn RecognitionEngine>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        let stats = SessionStats::new(id.clone());
        Self {
            id,
            state: SessionState::Unconfigured,
            config,
            engine,
            request: None,
            handle: None,
            engine_events: None,
            outbound,
            closing_deadline: None,
            stats,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The engine request this session streams with, once configured
    pub fn request(&self) -> Option<&RecognitionRequest> {
        self.request.as_ref()
    }

    /// Drive the session until it reaches `Closed`.
    ///
    /// Transport events and engine events are consumed one at a time, so no
    /// transition ever races another.
    pub async fn run(mut self, mut transport: mpsc::Receiver<TransportEvent>) -> SessionStats {
        info!(session_id = %self.id, engine = self.engine.name(), "Session started");

        while !self.state.is_terminal() {
            let closing_deadline = self.closing_deadline;
            let event = tokio::select! {
                event = transport.recv() => {
                    SessionEvent::Transport(event.unwrap_or(TransportEvent::Closed))
                }
                event = next_engine_event(&mut self.engine_events) => event,
                _ = wait_until(closing_deadline) => SessionEvent::CloseTimeout,
            };

            self.handle_event(event).await;
        }

        self.stats.state = self.state;
        info!(
            session_id = %self.id,
            duration_secs = self.stats.duration_secs(),
            chunks = self.stats.audio_chunks_forwarded,
            bytes = self.stats.audio_bytes_forwarded,
            dropped = self.stats.audio_chunks_dropped,
            interim = self.stats.interim_transcripts,
            finals = self.stats.final_transcripts,
            error = ?self.stats.close_error,
            "Session closed"
        );

        self.stats
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(TransportEvent::Frame(frame)) => self.on_frame(frame).await,
            SessionEvent::Transport(TransportEvent::Closed) => {
                info!(session_id = %self.id, state = %self.state, "Client disconnected");
                self.release_handle();
                self.state = SessionState::Closed;
            }
            SessionEvent::Transport(TransportEvent::Failed(reason)) => {
                let err = RelayError::TransportError(reason);
                warn!(session_id = %self.id, error = %err, "Client connection failed");
                self.stats.close_error.get_or_insert_with(|| err.code().to_string());
                self.release_handle();
                self.state = SessionState::Closed;
            }
            SessionEvent::Engine(EngineEvent::Transcript(event)) => self.on_transcript(event).await,
            SessionEvent::Engine(EngineEvent::Error(err)) => {
                if self.state == SessionState::Streaming {
                    self.fail(err).await;
                } else {
                    debug!(session_id = %self.id, error = %err, "Ignoring engine error while {}", self.state);
                }
            }
            SessionEvent::EngineEnded => {
                self.engine_events = None;
                if self.state == SessionState::Streaming {
                    self.fail(RelayError::EngineStreamError(
                        "recognition stream ended by the engine".to_string(),
                    ))
                    .await;
                }
            }
            SessionEvent::CloseTimeout => {
                debug!(session_id = %self.id, "Close handshake timed out");
                self.state = SessionState::Closed;
            }
        }
    }

    async fn on_frame(&mut self, frame: InboundFrame) {
        if !self.state.accepts_input() {
            debug!(session_id = %self.id, state = %self.state, "Ignoring client message");
            return;
        }

        match classify(frame, self.config.permissive_parsing) {
            Inbound::Config(client) => match self.state {
                SessionState::Unconfigured => self.configure(client).await,
                _ => self.reject_reconfigure().await,
            },
            Inbound::BadConfig(reason) => match self.state {
                SessionState::Unconfigured => self.fail(RelayError::InvalidConfig(reason)).await,
                _ => self.reject_reconfigure().await,
            },
            Inbound::Audio(data) => self.on_audio(data).await,
            Inbound::Ignored => {
                debug!(session_id = %self.id, "Ignoring non-config control message");
            }
            Inbound::Malformed(reason) => {
                let err = RelayError::Protocol(reason);
                warn!(session_id = %self.id, error = %err, "Rejecting malformed control message");
                self.reply_error(&err).await;
            }
        }
    }

    /// Validate the config, open the recognition stream and announce `ready`.
    async fn configure(&mut self, client: ClientConfig) {
        info!(
            session_id = %self.id,
            language = ?client.language,
            auto_detect = client.enable_auto_detection,
            "Received config"
        );

        // Validate before allocating anything upstream.
        let request = match self.config.policy.build_request(&client) {
            Ok(request) => request,
            Err(err) => return self.fail(err).await,
        };

        let channel = match self.engine.open(&self.id, &request).await {
            Ok(channel) => channel,
            Err(err) => return self.fail(err).await,
        };

        self.handle = Some(channel.handle);
        self.engine_events = Some(channel.events);
        self.request = Some(request);

        if let Err(err) = self.send(ServerMessage::Ready).await {
            return self.abandon(err);
        }

        self.state = SessionState::Streaming;
        info!(session_id = %self.id, "Recognition stream ready");
    }

    async fn reject_reconfigure(&mut self) {
        warn!(session_id = %self.id, "Config already active, ignoring new config");
        let message = ServerMessage::Error {
            code: "already_configured".to_string(),
            message: "Session is already configured".to_string(),
        };
        if let Err(err) = self.send(message).await {
            self.abandon(err);
        }
    }

    async fn on_audio(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }

        let handle = match (self.state, self.handle.as_mut()) {
            (SessionState::Streaming, Some(handle)) if !handle.is_terminated() => handle,
            (SessionState::Streaming, _) => {
                debug!(session_id = %self.id, "Recognition stream terminated, dropping audio");
                self.stats.audio_chunks_dropped += 1;
                return;
            }
            _ => {
                debug!(session_id = %self.id, bytes = data.len(), "No recognition stream yet, dropping audio");
                self.stats.audio_chunks_dropped += 1;
                return;
            }
        };

        let len = data.len() as u64;
        match handle.write(data).await {
            Ok(()) => {
                self.stats.audio_chunks_forwarded += 1;
                self.stats.audio_bytes_forwarded += len;
            }
            Err(err) => self.fail(err).await,
        }
    }

    async fn on_transcript(&mut self, event: TranscriptEvent) {
        if self.state != SessionState::Streaming {
            debug!(session_id = %self.id, state = %self.state, "Ignoring transcript");
            return;
        }

        if event.is_final {
            info!(session_id = %self.id, text = %event.text, "Final transcript");
            self.stats.final_transcripts += 1;
        } else {
            debug!(session_id = %self.id, text = %event.text, "Interim transcript");
            self.stats.interim_transcripts += 1;
        }

        let message = ServerMessage::Transcript {
            transcript: event.text,
            is_final: event.is_final,
        };
        if let Err(err) = self.send(message).await {
            self.abandon(err);
        }
    }

    /// Terminal error: notify the client, close the transport with the
    /// error's close code and release the recognition stream.
    async fn fail(&mut self, err: RelayError) {
        match &err {
            RelayError::InvalidConfig(_) | RelayError::EngineRejected(_) => {
                warn!(session_id = %self.id, error = %err, "Session config rejected")
            }
            _ => error!(session_id = %self.id, error = %err, "Session failed"),
        }
        self.stats.close_error = Some(err.code().to_string());

        self.release_handle();
        self.reply_error(&err).await;

        let close = Outbound::Close {
            code: err.close_code(),
            reason: err.close_reason().to_string(),
        };
        if self.outbound.send(close).await.is_err() {
            self.state = SessionState::Closed;
            return;
        }

        if self.state != SessionState::Closed {
            self.state = SessionState::Closing;
            self.closing_deadline = Some(Instant::now() + self.config.close_grace);
        }
    }

    /// The client writer is gone; nothing more can be delivered.
    fn abandon(&mut self, err: RelayError) {
        debug!(session_id = %self.id, error = %err, "Client writer gone");
        self.stats.close_error.get_or_insert_with(|| err.code().to_string());
        self.release_handle();
        self.state = SessionState::Closed;
    }

    async fn reply_error(&mut self, err: &RelayError) {
        let message = ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        };
        if let Err(send_err) = self.send(message).await {
            self.abandon(send_err);
        }
    }

    /// End and drop the recognition stream. The handle is taken, so every
    /// path that gets here releases it at most once.
    fn release_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.end();
            self.stats.handle_releases += 1;
            debug!(session_id = %self.id, "Recognition stream released");
        }
        self.engine_events = None;
    }

    async fn send(&self, message: ServerMessage) -> RelayResult<()> {
        self.outbound
            .send(Outbound::Message(message))
            .await
            .map_err(|_| RelayError::TransportError("client writer closed".to_string()))
    }
}

async fn next_engine_event(events: &mut Option<mpsc::Receiver<EngineEvent>>) -> SessionEvent {
    match events {
        Some(rx) => match rx.recv().await {
            Some(event) => SessionEvent::Engine(event),
            None => SessionEvent::EngineEnded,
        },
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

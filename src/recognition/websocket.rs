use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::engine::{EngineEvent, RecognitionChannel, RecognitionEngine, RecognitionHandle};
use super::messages::{
    AudioContentMessage, EndOfStreamMessage, StreamingRecognizeRequest, StreamingRecognizeResponse,
};
use super::request::RecognitionRequest;
use crate::config::RecognitionConfig;
use crate::error::{RelayError, RelayResult};

type EngineSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Engine events buffered towards the session
const EVENT_BUFFER: usize = 256;

/// Recognition engine reached over a duplex WebSocket stream
pub struct WebSocketEngine {
    url: String,
    api_key: Option<String>,
    open_timeout: Duration,
    write_buffer: usize,
    write_timeout: Duration,
    close_timeout: Duration,
}

impl WebSocketEngine {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self {
            url: config.engine_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            write_buffer: config.write_buffer_frames.max(1),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        }
    }

    fn request_url(&self) -> String {
        match &self.api_key {
            Some(key) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}key={}", self.url, sep, key)
            }
            None => self.url.clone(),
        }
    }

    /// Connect, send the streaming config and wait for the engine's
    /// acknowledgement.
    async fn handshake(&self, session_id: &str, request: &RecognitionRequest) -> RelayResult<EngineSocket> {
        let (mut socket, _response) = tokio_tungstenite::connect_async(self.request_url())
            .await
            .map_err(|e| RelayError::EngineRejected(format!("failed to connect to engine: {}", e)))?;

        let setup = serde_json::to_string(&StreamingRecognizeRequest::from(request))
            .map_err(|e| RelayError::EngineRejected(format!("failed to encode request: {}", e)))?;
        debug!(session_id = %session_id, setup = %setup, "Sending streaming config");

        socket
            .send(Message::Text(setup))
            .await
            .map_err(|e| RelayError::EngineRejected(format!("failed to send streaming config: {}", e)))?;

        while let Some(frame) = socket.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(data)) if data.first() == Some(&b'{') => {
                    String::from_utf8_lossy(&data).into_owned()
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.into_owned()).unwrap_or_default();
                    return Err(RelayError::EngineRejected(format!(
                        "engine closed the stream before acknowledging: {}",
                        reason
                    )));
                }
                Ok(other) => {
                    debug!(session_id = %session_id, frame = ?other, "Ignoring frame during setup");
                    continue;
                }
                Err(e) => {
                    return Err(RelayError::EngineRejected(format!("engine connection failed: {}", e)));
                }
            };

            match serde_json::from_str::<StreamingRecognizeResponse>(&text) {
                Ok(response) if response.error.is_some() => {
                    let status = response.error.map(|s| s.to_string()).unwrap_or_default();
                    return Err(RelayError::EngineRejected(status));
                }
                Ok(response) if response.setup_complete.is_some() => return Ok(socket),
                Ok(_) => debug!(session_id = %session_id, "Ignoring engine message during setup"),
                Err(e) => warn!(session_id = %session_id, error = %e, "Unparseable engine message during setup"),
            }
        }

        Err(RelayError::EngineRejected(
            "engine stream ended before acknowledging".to_string(),
        ))
    }

    /// Forward queued audio in order; once every sender is gone, tell the
    /// engine the audio is over and close our half.
    ///
    /// `closing` fires (or is dropped) when this loop is done, which starts
    /// the inbound loop's close deadline.
    async fn outbound_loop(
        mut audio_rx: mpsc::Receiver<Vec<u8>>,
        mut sink: SplitSink<EngineSocket, Message>,
        terminated: Arc<AtomicBool>,
        closing: oneshot::Sender<()>,
        write_timeout: Duration,
        close_timeout: Duration,
        session_id: String,
    ) {
        let mut chunks: u64 = 0;
        let mut bytes: u64 = 0;

        while let Some(pcm) = audio_rx.recv().await {
            chunks += 1;
            bytes += pcm.len() as u64;

            let json = match serde_json::to_string(&AudioContentMessage::new(&pcm)) {
                Ok(json) => json,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Failed to encode audio chunk");
                    continue;
                }
            };

            match tokio::time::timeout(write_timeout, sink.send(Message::Text(json))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "Engine send failed, closing outbound loop");
                    terminated.store(true, Ordering::SeqCst);
                    return;
                }
                Err(_) => {
                    warn!(session_id = %session_id, "Engine stopped reading audio, closing outbound loop");
                    terminated.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }

        let finish = async {
            if let Ok(json) = serde_json::to_string(&EndOfStreamMessage::default()) {
                let _ = sink.send(Message::Text(json)).await;
            }
            let _ = sink.send(Message::Close(None)).await;
        };
        if tokio::time::timeout(close_timeout, finish).await.is_err() {
            warn!(session_id = %session_id, "Engine stopped reading, end-of-stream not delivered");
        }
        let _ = closing.send(());

        debug!(session_id = %session_id, chunks, bytes, "Outbound loop finished");
    }

    /// Translate engine frames into session events until the stream ends or
    /// the session stops listening.
    ///
    /// Once the outbound side has finished, the engine gets `close_timeout`
    /// to close; after that the connection is dropped.
    async fn inbound_loop(
        mut stream: SplitStream<EngineSocket>,
        event_tx: mpsc::Sender<EngineEvent>,
        terminated: Arc<AtomicBool>,
        mut closing: oneshot::Receiver<()>,
        close_timeout: Duration,
        session_id: String,
    ) {
        let mut close_deadline: Option<Instant> = None;

        loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = &mut closing, if close_deadline.is_none() => {
                    close_deadline = Some(Instant::now() + close_timeout);
                    continue;
                }
                _ = wait_until(close_deadline) => {
                    warn!(session_id = %session_id, "Engine did not close in time, dropping connection");
                    break;
                }
            };
            let Some(frame) = frame else {
                break;
            };

            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(data)) if data.first() == Some(&b'{') => {
                    String::from_utf8_lossy(&data).into_owned()
                }
                Ok(Message::Binary(data)) => {
                    warn!(session_id = %session_id, len = data.len(), "Skipping non-JSON binary frame from engine");
                    continue;
                }
                Ok(Message::Close(Some(frame))) if frame.code != CloseCode::Normal => {
                    terminated.store(true, Ordering::SeqCst);
                    let _ = event_tx
                        .send(EngineEvent::Error(RelayError::EngineStreamError(format!(
                            "engine closed with {}: {}",
                            frame.code, frame.reason
                        ))))
                        .await;
                    return;
                }
                Ok(Message::Close(_)) => {
                    info!(session_id = %session_id, "Engine closed the recognition stream");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Engine connection error");
                    terminated.store(true, Ordering::SeqCst);
                    let _ = event_tx
                        .send(EngineEvent::Error(RelayError::EngineStreamError(format!(
                            "engine connection error: {}",
                            e
                        ))))
                        .await;
                    return;
                }
            };

            let response = match serde_json::from_str::<StreamingRecognizeResponse>(&text) {
                Ok(response) => response,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to parse engine message");
                    continue;
                }
            };

            if let Some(status) = response.error {
                terminated.store(true, Ordering::SeqCst);
                let _ = event_tx
                    .send(EngineEvent::Error(RelayError::EngineStreamError(status.to_string())))
                    .await;
                return;
            }

            if let Some(result) = response.results.first() {
                debug!(
                    session_id = %session_id,
                    language = ?result.language_code,
                    confidence = ?result.alternatives.first().and_then(|a| a.confidence),
                    "Engine result"
                );
            }

            if let Some(event) = response.transcript_event() {
                if event_tx.send(EngineEvent::Transcript(event)).await.is_err() {
                    debug!(session_id = %session_id, "Session stopped listening, closing inbound loop");
                    break;
                }
            }
        }

        terminated.store(true, Ordering::SeqCst);
        debug!(session_id = %session_id, "Inbound loop finished");
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for WebSocketEngine {
    async fn open(&self, session_id: &str, request: &RecognitionRequest) -> RelayResult<RecognitionChannel> {
        info!(
            session_id = %session_id,
            language = %request.language_code,
            alternatives = ?request.alternative_language_codes,
            sample_rate = request.sample_rate_hertz,
            "Opening recognition stream"
        );

        let socket = tokio::time::timeout(self.open_timeout, self.handshake(session_id, request))
            .await
            .map_err(|_| {
                RelayError::EngineRejected(format!(
                    "engine did not acknowledge within {}ms",
                    self.open_timeout.as_millis()
                ))
            })??;

        let (sink, stream) = socket.split();
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(self.write_buffer);
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(EVENT_BUFFER);
        let (closing_tx, closing_rx) = oneshot::channel();
        let terminated = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::outbound_loop(
            audio_rx,
            sink,
            Arc::clone(&terminated),
            closing_tx,
            self.write_timeout,
            self.close_timeout,
            session_id.to_string(),
        ));
        tokio::spawn(Self::inbound_loop(
            stream,
            event_tx,
            Arc::clone(&terminated),
            closing_rx,
            self.close_timeout,
            session_id.to_string(),
        ));

        Ok(RecognitionChannel {
            handle: Box::new(WebSocketHandle {
                audio_tx: Some(audio_tx),
                terminated,
                write_timeout: self.write_timeout,
            }),
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

/// Write side of a `WebSocketEngine` stream
pub struct WebSocketHandle {
    /// `None` once `end` has been called
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
    terminated: Arc<AtomicBool>,
    write_timeout: Duration,
}

#[async_trait::async_trait]
impl RecognitionHandle for WebSocketHandle {
    async fn write(&mut self, audio: Vec<u8>) -> RelayResult<()> {
        if self.is_terminated() {
            return Ok(());
        }
        let Some(tx) = &self.audio_tx else {
            return Ok(());
        };

        match tx.send_timeout(audio, self.write_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(RelayError::ResourceExhausted(format!(
                "engine did not drain audio within {}ms",
                self.write_timeout.as_millis()
            ))),
            Err(SendTimeoutError::Closed(_)) => {
                self.terminated.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn end(&mut self) {
        // Dropping the last sender lets the outbound loop flush queued audio
        // and then send end-of-stream.
        self.audio_tx.take();
    }

    fn is_terminated(&self) -> bool {
        self.audio_tx.is_none() || self.terminated.load(Ordering::SeqCst)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_appends_key() {
        let mut cfg = RecognitionConfig::default();
        cfg.engine_url = "wss://speech.example.com/stream".to_string();
        cfg.api_key = Some("secret".to_string());
        assert_eq!(
            WebSocketEngine::new(&cfg).request_url(),
            "wss://speech.example.com/stream?key=secret"
        );

        cfg.engine_url = "wss://speech.example.com/stream?alt=json".to_string();
        assert_eq!(
            WebSocketEngine::new(&cfg).request_url(),
            "wss://speech.example.com/stream?alt=json&key=secret"
        );
    }

    #[test]
    fn test_blank_key_is_ignored() {
        let mut cfg = RecognitionConfig::default();
        cfg.api_key = Some("  ".to_string());
        assert_eq!(WebSocketEngine::new(&cfg).request_url(), cfg.engine_url);
    }
}

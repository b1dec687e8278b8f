//! Shared test fixtures: a scripted recognition engine and session helpers

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use stt_relay::{
    EngineEvent, Outbound, RecognitionChannel, RecognitionEngine, RecognitionHandle,
    RecognitionRequest, RelayError, RelayResult, Session, SessionConfig, SessionStats,
    TranscriptEvent, TransportEvent,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything the mock engine observed
#[derive(Debug, Default)]
pub struct MockLog {
    pub opens: Vec<RecognitionRequest>,
    pub writes: Vec<Vec<u8>>,
    pub ends: usize,
}

/// Recognition engine whose behavior is scripted by the test
#[derive(Clone, Default)]
pub struct MockEngine {
    pub log: Arc<Mutex<MockLog>>,
    /// Sender for the currently open stream's events
    events: Arc<Mutex<Option<mpsc::Sender<EngineEvent>>>>,
    reject: Arc<Mutex<Option<RelayError>>>,
    write_error: Arc<Mutex<Option<RelayError>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail
    pub fn reject_with(&self, err: RelayError) {
        *self.reject.lock().unwrap() = Some(err);
    }

    /// Make every subsequent `write` fail
    pub fn fail_writes_with(&self, err: RelayError) {
        *self.write_error.lock().unwrap() = Some(err);
    }

    pub async fn emit(&self, event: EngineEvent) {
        let tx = self.events.lock().unwrap().clone();
        tx.expect("no open stream").send(event).await.unwrap();
    }

    pub async fn transcript(&self, text: &str, is_final: bool) {
        self.emit(EngineEvent::Transcript(TranscriptEvent {
            text: text.to_string(),
            is_final,
        }))
        .await;
    }

    /// Drop the event sender, as if the engine ended the stream itself
    pub fn hang_up(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens.len()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().writes.clone()
    }

    pub fn ends(&self) -> usize {
        self.log.lock().unwrap().ends
    }

    pub fn last_request(&self) -> Option<RecognitionRequest> {
        self.log.lock().unwrap().opens.last().cloned()
    }
}

struct MockHandle {
    log: Arc<Mutex<MockLog>>,
    write_error: Arc<Mutex<Option<RelayError>>>,
    ended: bool,
}

#[async_trait::async_trait]
impl RecognitionHandle for MockHandle {
    async fn write(&mut self, audio: Vec<u8>) -> RelayResult<()> {
        if let Some(err) = self.write_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.log.lock().unwrap().writes.push(audio);
        Ok(())
    }

    fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.log.lock().unwrap().ends += 1;
        }
    }

    fn is_terminated(&self) -> bool {
        self.ended
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for MockEngine {
    async fn open(&self, _session_id: &str, request: &RecognitionRequest) -> RelayResult<RecognitionChannel> {
        if let Some(err) = self.reject.lock().unwrap().take() {
            return Err(err);
        }

        self.log.lock().unwrap().opens.push(request.clone());
        let (tx, rx) = mpsc::channel(64);
        *self.events.lock().unwrap() = Some(tx);

        Ok(RecognitionChannel {
            handle: Box::new(MockHandle {
                log: Arc::clone(&self.log),
                write_error: Arc::clone(&self.write_error),
                ended: false,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A running session wired to in-memory transport channels
pub struct SessionHarness {
    pub engine: MockEngine,
    pub inbound: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<Outbound>,
    pub task: JoinHandle<SessionStats>,
}

impl SessionHarness {
    pub fn start(config: SessionConfig) -> Self {
        Self::start_with(MockEngine::new(), config)
    }

    pub fn start_with(engine: MockEngine, config: SessionConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let session = Session::new(
            "test-session".to_string(),
            config,
            Arc::new(engine.clone()),
            outbound_tx,
        );
        let task = tokio::spawn(session.run(inbound_rx));

        Self {
            engine,
            inbound: inbound_tx,
            outbound: outbound_rx,
            task,
        }
    }

    pub async fn text(&self, text: &str) {
        self.inbound
            .send(TransportEvent::Frame(stt_relay::InboundFrame::Text(text.to_string())))
            .await
            .unwrap();
    }

    pub async fn binary(&self, data: &[u8]) {
        self.inbound
            .send(TransportEvent::Frame(stt_relay::InboundFrame::Binary(data.to_vec())))
            .await
            .unwrap();
    }

    pub async fn client_close(&self) {
        self.inbound.send(TransportEvent::Closed).await.unwrap();
    }

    pub async fn configure(&self, language: &str) {
        self.text(&format!(
            r#"{{"type":"config","language":"{}","enableAutoDetection":false}}"#,
            language
        ))
        .await;
    }

    /// Next outbound item, failing the test if none arrives promptly
    pub async fn next(&mut self) -> Outbound {
        tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("outbound channel closed")
    }

    /// Wait for the session to finish
    pub async fn finish(self) -> SessionStats {
        drop(self.inbound);
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("session did not finish")
            .unwrap()
    }
}

/// Let spawned tasks run until the session has processed queued events
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

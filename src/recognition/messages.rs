//! Engine wire format
//!
//! JSON frames shaped after the streaming recognize API: a single
//! `streamingConfig` request, then `audioContent` frames, then
//! `endOfStream`. The engine answers with `setupComplete`, `results` or a
//! terminal `error`.

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::engine::TranscriptEvent;
use super::request::RecognitionRequest;

/// First frame sent on a new stream
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingRecognizeRequest {
    pub streaming_config: StreamingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfig {
    pub config: RecognitionConfigMessage,
    pub interim_results: bool,
    pub single_utterance: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfigMessage {
    pub encoding: String,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    pub alternative_language_codes: Vec<String>,
    pub enable_automatic_punctuation: bool,
    pub enable_word_time_offsets: bool,
}

/// Audio chunk (base64-encoded PCM bytes)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContentMessage {
    pub audio_content: String,
}

/// Sent once when the client stops streaming
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndOfStreamMessage {
    pub end_of_stream: bool,
}

/// Any frame received from the engine
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingRecognizeResponse {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,

    #[serde(default)]
    pub results: Vec<StreamingRecognitionResult>,

    #[serde(default)]
    pub error: Option<EngineStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingRecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<RecognitionAlternative>,

    #[serde(default)]
    pub is_final: bool,

    /// Language the engine detected for this result
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecognitionAlternative {
    #[serde(default)]
    pub transcript: String,

    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Error status, e.g. `{"code":3,"status":"INVALID_ARGUMENT","message":"..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct EngineStatus {
    #[serde(default)]
    pub code: Option<i32>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

impl From<&RecognitionRequest> for StreamingRecognizeRequest {
    fn from(request: &RecognitionRequest) -> Self {
        Self {
            streaming_config: StreamingConfig {
                config: RecognitionConfigMessage {
                    encoding: request.encoding.clone(),
                    sample_rate_hertz: request.sample_rate_hertz,
                    language_code: request.language_code.clone(),
                    alternative_language_codes: request.alternative_language_codes.clone(),
                    enable_automatic_punctuation: request.enable_automatic_punctuation,
                    enable_word_time_offsets: request.enable_word_time_offsets,
                },
                interim_results: request.interim_results,
                single_utterance: request.single_utterance,
            },
        }
    }
}

impl AudioContentMessage {
    pub fn new(pcm: &[u8]) -> Self {
        Self {
            audio_content: base64::engine::general_purpose::STANDARD.encode(pcm),
        }
    }
}

impl Default for EndOfStreamMessage {
    fn default() -> Self {
        Self { end_of_stream: true }
    }
}

impl StreamingRecognizeResponse {
    /// The transcript of the first alternative of the first result, if any
    pub fn transcript_event(&self) -> Option<TranscriptEvent> {
        let result = self.results.first()?;
        let alternative = result.alternatives.first()?;

        Some(TranscriptEvent {
            text: alternative.transcript.clone(),
            is_final: result.is_final,
        })
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status.as_deref().unwrap_or("UNKNOWN");
        let message = self.message.as_deref().unwrap_or("no message");
        match self.code {
            Some(code) => write!(f, "{} ({}): {}", status, code, message),
            None => write!(f, "{}: {}", status, message),
        }
    }
}

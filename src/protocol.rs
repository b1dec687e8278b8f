//! Client ↔ relay message protocol
//!
//! Inbound frames are classified by frame type: text frames carry JSON
//! control messages, binary frames carry raw 16-bit PCM audio. Permissive
//! mode restores payload sniffing for clients that send everything in one
//! frame type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One-time session configuration sent by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// BCP-47 language tag, e.g. "en-US"
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub enable_auto_detection: bool,

    /// Overrides the deployment sample rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<u32>,

    /// Overrides the deployment encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Messages the relay sends to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The recognition stream is open and audio may flow
    Ready,

    Transcript {
        transcript: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },

    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Plain enum of strings and bools; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// A message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// What an inbound frame means to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `{"type":"config", ...}` with well-formed fields
    Config(ClientConfig),

    /// `{"type":"config", ...}` whose fields failed to parse
    BadConfig(String),

    /// Raw PCM audio chunk
    Audio(Vec<u8>),

    /// Valid JSON without `type: "config"`
    Ignored,

    /// Text that is not JSON (hardened mode only)
    Malformed(String),
}

/// Classify an inbound frame.
pub fn classify(frame: InboundFrame, permissive: bool) -> Inbound {
    match frame {
        InboundFrame::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => control_from_value(value),
            Err(_) if permissive => Inbound::Audio(text.into_bytes()),
            Err(e) => Inbound::Malformed(e.to_string()),
        },
        InboundFrame::Binary(data) => {
            if permissive {
                if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(&data) {
                    return control_from_value(value);
                }
            }
            Inbound::Audio(data)
        }
    }
}

fn control_from_value(value: Value) -> Inbound {
    if value.get("type").and_then(Value::as_str) != Some("config") {
        return Inbound::Ignored;
    }

    match serde_json::from_value::<ClientConfig>(value) {
        Ok(config) => Inbound::Config(config),
        Err(e) => Inbound::BadConfig(e.to_string()),
    }
}

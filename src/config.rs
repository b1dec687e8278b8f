use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable prefix, e.g. `STT_RELAY_SERVICE__HTTP__PORT=9000`
const ENV_PREFIX: &str = "STT_RELAY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recognition: RecognitionConfig,
    pub protocol: ProtocolConfig,
    pub keepalive: KeepaliveConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Maximum concurrent client sessions (0 = unlimited)
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Settings for the upstream recognition engine and the request policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// WebSocket URL of the streaming recognition engine
    pub engine_url: String,

    /// Sent as the `key` query parameter when present
    pub api_key: Option<String>,

    /// Language used when the client config omits one
    pub default_language: String,

    /// Primary language forced when the client asks for auto-detection.
    /// `None` keeps the client's language as primary.
    pub auto_detect_primary_language: Option<String>,

    /// Alternative languages offered to the engine for auto-detection
    pub auto_detect_alternatives: Vec<String>,

    /// Accepted client languages (empty = any well-formed tag)
    pub supported_languages: Vec<String>,

    /// Sample rate used when the client config omits one
    pub sample_rate_hertz: u32,

    /// Sample rates a client may request
    pub supported_sample_rates: Vec<u32>,

    /// Audio encoding expected by the engine
    pub encoding: String,

    pub interim_results: bool,
    pub enable_automatic_punctuation: bool,
    pub enable_word_time_offsets: bool,

    /// How long `open` waits for the engine to acknowledge the request
    pub open_timeout_ms: u64,

    /// Audio frames buffered towards the engine before writes start waiting
    pub write_buffer_frames: usize,

    /// How long a write may wait on a full buffer before the session is closed
    pub write_timeout_ms: u64,

    /// How long the engine gets to finish closing after end-of-stream
    /// before the connection is dropped
    pub close_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Fall back to payload sniffing: JSON in a binary frame is control,
    /// non-JSON in a text frame is audio
    pub permissive_parsing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    pub enabled: bool,
    /// URL pinged periodically, normally this service's own `/keep-alive`
    pub url: String,
    pub interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "stt-relay".to_string(),
            http: HttpConfig::default(),
            max_sessions: 0,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine_url: "ws://127.0.0.1:9090/v1/speech:streamingRecognize".to_string(),
            api_key: None,
            default_language: "en-US".to_string(),
            auto_detect_primary_language: Some("hi-IN".to_string()),
            auto_detect_alternatives: vec!["en-US".to_string()],
            supported_languages: Vec::new(),
            sample_rate_hertz: 16000,
            supported_sample_rates: vec![8000, 16000, 24000, 48000],
            encoding: "LINEAR16".to_string(),
            interim_results: true,
            enable_automatic_punctuation: true,
            enable_word_time_offsets: true,
            open_timeout_ms: 10_000,
            write_buffer_frames: 256,
            write_timeout_ms: 2_000,
            close_timeout_ms: 5_000,
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:3001/keep-alive".to_string(),
            interval_secs: 300,
        }
    }
}

impl Config {
    /// Load from an optional config file, then `STT_RELAY_*` environment
    /// variables, then the platform `PORT` variable.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("service.http.port", port)?;
        }

        let settings = builder.build().context("Failed to read configuration")?;
        let cfg: Config = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.http.port == 0 {
            bail!("service.http.port cannot be 0");
        }

        let recognition = &self.recognition;
        if recognition.engine_url.is_empty() {
            bail!("recognition.engine_url must be set");
        }
        if recognition.auto_detect_alternatives.is_empty() {
            bail!("recognition.auto_detect_alternatives must not be empty");
        }
        if recognition.close_timeout_ms == 0 {
            bail!("recognition.close_timeout_ms must be greater than 0");
        }
        if recognition.write_buffer_frames == 0 {
            bail!("recognition.write_buffer_frames must be greater than 0");
        }
        if !recognition
            .supported_sample_rates
            .contains(&recognition.sample_rate_hertz)
        {
            bail!(
                "recognition.sample_rate_hertz {} is not in supported_sample_rates",
                recognition.sample_rate_hertz
            );
        }

        if self.keepalive.enabled && self.keepalive.interval_secs == 0 {
            bail!("keepalive.interval_secs must be greater than 0");
        }

        Ok(())
    }
}

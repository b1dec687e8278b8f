use crate::config::RecognitionConfig;
use crate::error::{RelayError, RelayResult};
use crate::protocol::ClientConfig;

/// Deployment-wide rules for turning a client config into an engine request.
///
/// Read-only after startup and shared by every session.
#[derive(Debug, Clone)]
pub struct RecognitionPolicy {
    pub default_language: String,
    pub auto_detect_primary_language: Option<String>,
    pub auto_detect_alternatives: Vec<String>,
    pub supported_languages: Vec<String>,
    pub default_sample_rate: u32,
    pub supported_sample_rates: Vec<u32>,
    pub encoding: String,
    pub interim_results: bool,
    pub enable_automatic_punctuation: bool,
    pub enable_word_time_offsets: bool,
}

/// Snapshot of a session's config in engine terms, fixed for the life of
/// the recognition stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    pub language_code: String,
    pub alternative_language_codes: Vec<String>,
    pub sample_rate_hertz: u32,
    pub encoding: String,
    pub interim_results: bool,
    pub single_utterance: bool,
    pub enable_automatic_punctuation: bool,
    pub enable_word_time_offsets: bool,
}

impl From<&RecognitionConfig> for RecognitionPolicy {
    fn from(cfg: &RecognitionConfig) -> Self {
        Self {
            default_language: cfg.default_language.clone(),
            auto_detect_primary_language: cfg.auto_detect_primary_language.clone(),
            auto_detect_alternatives: cfg.auto_detect_alternatives.clone(),
            supported_languages: cfg.supported_languages.clone(),
            default_sample_rate: cfg.sample_rate_hertz,
            supported_sample_rates: cfg.supported_sample_rates.clone(),
            encoding: cfg.encoding.clone(),
            interim_results: cfg.interim_results,
            enable_automatic_punctuation: cfg.enable_automatic_punctuation,
            enable_word_time_offsets: cfg.enable_word_time_offsets,
        }
    }
}

impl Default for RecognitionPolicy {
    fn default() -> Self {
        Self::from(&RecognitionConfig::default())
    }
}

impl RecognitionPolicy {
    /// Validate a client config and translate it into an engine request.
    ///
    /// Auto-detection sets a primary language plus a non-empty alternative
    /// set; otherwise the client's language (or the default) is used alone.
    pub fn build_request(&self, client: &ClientConfig) -> RelayResult<RecognitionRequest> {
        // A blank language means "use the default", same as omitting it.
        let client_language = match client.language.as_deref().map(str::trim) {
            Some(lang) if !lang.is_empty() => Some(self.check_language(lang)?),
            _ => None,
        };

        let sample_rate_hertz = match client.sample_rate_hertz {
            Some(rate) if self.supported_sample_rates.contains(&rate) => rate,
            Some(rate) => {
                return Err(RelayError::InvalidConfig(format!(
                    "unsupported sample rate {} Hz (supported: {:?})",
                    rate, self.supported_sample_rates
                )))
            }
            None => self.default_sample_rate,
        };

        let encoding = match client.encoding.as_deref() {
            Some(enc) if enc.eq_ignore_ascii_case(&self.encoding) => self.encoding.clone(),
            Some(enc) => {
                return Err(RelayError::InvalidConfig(format!(
                    "unsupported encoding {} (expected {})",
                    enc, self.encoding
                )))
            }
            None => self.encoding.clone(),
        };

        let (language_code, alternative_language_codes) = if client.enable_auto_detection {
            self.auto_detect_languages(client_language)?
        } else {
            let language = client_language.unwrap_or_else(|| self.default_language.clone());
            (language, Vec::new())
        };

        Ok(RecognitionRequest {
            language_code,
            alternative_language_codes,
            sample_rate_hertz,
            encoding,
            interim_results: self.interim_results,
            single_utterance: false,
            enable_automatic_punctuation: self.enable_automatic_punctuation,
            enable_word_time_offsets: self.enable_word_time_offsets,
        })
    }

    fn auto_detect_languages(&self, client_language: Option<String>) -> RelayResult<(String, Vec<String>)> {
        let primary = self
            .auto_detect_primary_language
            .clone()
            .or_else(|| client_language.clone())
            .unwrap_or_else(|| self.default_language.clone());

        let mut alternatives: Vec<String> = Vec::new();
        for lang in self.auto_detect_alternatives.iter().chain(client_language.iter()) {
            let duplicate = lang.eq_ignore_ascii_case(&primary)
                || alternatives.iter().any(|a| a.eq_ignore_ascii_case(lang));
            if !duplicate {
                alternatives.push(lang.clone());
            }
        }

        if alternatives.is_empty() {
            return Err(RelayError::InvalidConfig(format!(
                "auto-detection needs at least one alternative language besides {}",
                primary
            )));
        }

        Ok((primary, alternatives))
    }

    fn check_language(&self, lang: &str) -> RelayResult<String> {
        if !is_language_tag(lang) {
            return Err(RelayError::InvalidConfig(format!("malformed language tag {:?}", lang)));
        }

        if !self.supported_languages.is_empty()
            && !self.supported_languages.iter().any(|s| s.eq_ignore_ascii_case(lang))
        {
            return Err(RelayError::InvalidConfig(format!("unsupported language {}", lang)));
        }

        Ok(lang.to_string())
    }
}

/// Loose BCP-47 shape check: a 2-3 letter primary subtag followed by
/// 1-8 character alphanumeric subtags.
fn is_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let primary_ok = parts
        .next()
        .map(|p| (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);

    primary_ok && parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(language: Option<&str>, auto: bool) -> ClientConfig {
        ClientConfig {
            language: language.map(str::to_string),
            enable_auto_detection: auto,
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_language_tag_shapes() {
        assert!(is_language_tag("en"));
        assert!(is_language_tag("en-US"));
        assert!(is_language_tag("cmn-Hans-CN"));
        assert!(!is_language_tag("e"));
        assert!(!is_language_tag("english"));
        assert!(!is_language_tag("en_US"));
        assert!(!is_language_tag("en-"));
    }

    #[test]
    fn test_unsupported_language_when_list_is_set() {
        let policy = RecognitionPolicy {
            supported_languages: vec!["en-US".into(), "hi-IN".into()],
            ..RecognitionPolicy::default()
        };
        assert!(policy.build_request(&client(Some("en-us"), false)).is_ok());
        assert!(matches!(
            policy.build_request(&client(Some("fr-FR"), false)),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_blank_language_uses_default() {
        let policy = RecognitionPolicy {
            default_language: "en-IN".to_string(),
            ..RecognitionPolicy::default()
        };
        for blank in ["", "  "] {
            let request = policy.build_request(&client(Some(blank), false)).unwrap();
            assert_eq!(request.language_code, "en-IN");
            assert!(request.alternative_language_codes.is_empty());
        }
    }
}

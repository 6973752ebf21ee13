use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{TranslationConfig, TranslationProvider};
use crate::error::TranslateError;

const GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Longest text the endpoint translates in one request, in characters
const MAX_CHUNK_CHARS: usize = 5000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

/// Translate `text`, falling back to the original on any failure.
/// Empty input never reaches the translator.
pub async fn translate_or_passthrough(translator: &dyn Translate, text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    match translator.translate(text).await {
        Ok(translated) => translated,
        Err(e) => {
            warn!("Translation failed, relaying original text: {}", e);
            text.to_string()
        }
    }
}

/// Build the translator selected in config
pub fn from_config(config: &TranslationConfig) -> Result<Box<dyn Translate>, reqwest::Error> {
    match config.provider {
        TranslationProvider::Google => Ok(Box::new(GoogleTranslator::new(
            &config.source,
            &config.target,
        )?)),
        TranslationProvider::None => Ok(Box::new(Passthrough)),
    }
}

/// Leaves text untouched
pub struct Passthrough;

#[async_trait]
impl Translate for Passthrough {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        Ok(text.to_string())
    }
}

/// Google Translate's public web endpoint
pub struct GoogleTranslator {
    client: reqwest::Client,
    source: String,
    target: String,
}

impl GoogleTranslator {
    pub fn new(source: &str, target: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            source: source.to_string(),
            target: target.to_string(),
        })
    }

    async fn translate_chunk(&self, chunk: &str) -> Result<String, TranslateError> {
        let response = self
            .client
            .get(GOOGLE_ENDPOINT)
            .query(&[
                ("client", "gtx"),
                ("sl", self.source.as_str()),
                ("tl", self.target.as_str()),
                ("dt", "t"),
                ("q", chunk),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status));
        }

        let body = response.text().await?;
        parse_google_response(&body)
    }
}

#[async_trait]
impl Translate for GoogleTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        debug!(
            "Translating {} chars in {} chunk(s) to '{}'",
            text.chars().count(),
            chunks.len(),
            self.target
        );

        let mut translated = String::with_capacity(text.len());
        for chunk in &chunks {
            translated.push_str(&self.translate_chunk(chunk).await?);
        }
        Ok(translated)
    }
}

/// The response is `[[["translated", "original", ...], ...], ...]`
fn parse_google_response(body: &str) -> Result<String, TranslateError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TranslateError::Malformed(e.to_string()))?;

    let segments = value
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TranslateError::Malformed("missing segment list".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|s| s.as_str()))
        .collect();

    if translated.is_empty() {
        return Err(TranslateError::Malformed("no translated segments".to_string()));
    }
    Ok(translated)
}

/// Break `text` into pieces of at most `max_chars` characters, cutting
/// after the last newline (else space) in each window.
fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while let Some((window_end, _)) = rest.char_indices().nth(max_chars) {
        let window = &rest[..window_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(window_end);
        let (piece, tail) = rest.split_at(cut);
        pieces.push(piece);
        rest = tail;
    }

    pieces.push(rest);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails;

    #[async_trait]
    impl Translate for AlwaysFails {
        async fn translate(&self, _text: &str) -> Result<String, TranslateError> {
            Err(TranslateError::Malformed("boom".to_string()))
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translate for Counting {
        async fn translate(&self, text: &str) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("[es] {}", text))
        }
    }

    #[tokio::test]
    async fn test_failure_passes_text_through() {
        for text in ["Gol!", "Goal in the 90th minute", "¿Qué?", "  padded  "] {
            assert_eq!(translate_or_passthrough(&AlwaysFails, text).await, text);
        }
    }

    #[tokio::test]
    async fn test_empty_text_skips_translator() {
        let translator = Counting::default();
        assert_eq!(translate_or_passthrough(&translator, "").await, "");
        assert_eq!(translate_or_passthrough(&translator, "   ").await, "   ");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);

        assert_eq!(translate_or_passthrough(&translator, "Gol!").await, "[es] Gol!");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_passthrough_provider() {
        let config = TranslationConfig {
            provider: TranslationProvider::None,
            source: "auto".to_string(),
            target: "es".to_string(),
        };
        let translator = from_config(&config).unwrap();
        assert_eq!(translator.translate("Goal!").await.unwrap(), "Goal!");
    }

    #[test]
    fn test_parse_google_response() {
        let body = r#"[[["¡Gol! ","Goal! ",null,null,10],["Qué partido.","What a match.",null,null,10]],null,"en"]"#;
        assert_eq!(parse_google_response(body).unwrap(), "¡Gol! Qué partido.");
    }

    #[test]
    fn test_parse_google_response_malformed() {
        assert!(parse_google_response("<html></html>").is_err());
        assert!(parse_google_response("[null,null,\"en\"]").is_err());
        assert!(parse_google_response("[[],null,\"en\"]").is_err());
    }

    #[test]
    fn test_split_short_text() {
        assert_eq!(split_text("hola", 10), vec!["hola"]);
        assert_eq!(split_text("hola", 4), vec!["hola"]);
    }

    #[test]
    fn test_split_prefers_newlines_and_roundtrips() {
        let text = "primera linea\nsegunda linea\ntercera";
        let chunks = split_text(text, 20);
        assert_eq!(chunks[0], "primera linea\n");
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "ñ".repeat(30);
        let chunks = split_text(&text, 7);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(chunks.concat(), text);

        let long = "ñ".repeat(MAX_CHUNK_CHARS);
        assert_eq!(split_text(&long, MAX_CHUNK_CHARS).len(), 1);
        let longer = "ñ".repeat(MAX_CHUNK_CHARS + 1);
        assert_eq!(split_text(&longer, MAX_CHUNK_CHARS).len(), 2);
    }
}

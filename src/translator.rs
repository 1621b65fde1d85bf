//! Translator
//!
//! Translation failures are recoverable: they abort the current attempt
//! only, never the event loop.

use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `to`. `from` defaults to auto-detection.
    async fn translate(&self, text: &str, from: Option<&str>, to: &str) -> Result<String>;
}

/// Client for the public Google translate endpoint (the `client=gtx`
/// variant, no API key). The response is a nested array whose first
/// element lists translated segments.
pub struct GoogleTranslator {
    http: reqwest::Client,
}

impl GoogleTranslator {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, from: Option<&str>, to: &str) -> Result<String> {
        let resp = self
            .http
            .get("https://translate.googleapis.com/translate_a/single")
            .query(&[
                ("client", "gtx"),
                ("sl", from.unwrap_or("auto")),
                ("tl", to),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BotError::Remote(format!(
                "translate endpoint returned {}",
                resp.status()
            )));
        }
        let body: Value = resp.json().await?;
        let segments = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| BotError::Remote("unexpected translate response shape".into()))?;
        let mut out = String::new();
        for seg in segments {
            if let Some(piece) = seg.get(0).and_then(Value::as_str) {
                out.push_str(piece);
            }
        }
        Ok(out)
    }
}

//! Suggestion provider: asks a chat model for a fix to an issue.
//!
//! Only `ollama` (`POST /api/chat`, non-streaming) is supported; the
//! `disabled` provider returns an error on every call.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SuggestConfig;
use crate::embedding::{post_json_with_retry, OLLAMA_URL};

const SYSTEM_PROMPT: &str = "You are an expert who understands both Chinese and English. \
Suggest a concise and precise solution for the user's issue, based only on the text provided. \
If you cannot identify the issue from the text, answer exactly 'No suggestion'. \
Keep the answer under 600 tokens. If the text contains Chinese, answer in Traditional Chinese.";

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce a free-text suggestion for the issue described by `text`.
    async fn suggest(&self, text: &str) -> Result<String>;
}

pub struct DisabledSuggester;

#[async_trait]
impl SuggestionProvider for DisabledSuggester {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn suggest(&self, _text: &str) -> Result<String> {
        bail!("Suggestion provider is disabled")
    }
}

/// Chat completion against a local Ollama instance.
pub struct OllamaSuggester {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaSuggester {
    pub fn new(config: &SuggestConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("suggest.model required for Ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_URL.to_string()),
            client,
        })
    }
}

#[async_trait]
impl SuggestionProvider for OllamaSuggester {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn suggest(&self, text: &str) -> Result<String> {
        let body = chat_body(&self.model, text);
        let endpoint = format!("{}/api/chat", self.url.trim_end_matches('/'));

        let json = post_json_with_retry(
            || self.client.post(&endpoint).json(&body),
            0,
            "Ollama chat",
        )
        .await?;

        parse_chat_response(&json)
    }
}

fn chat_body(model: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": text }
        ],
        "stream": false
    })
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama chat response: missing message.content"))
}

pub fn create_suggester(config: &SuggestConfig) -> Result<Arc<dyn SuggestionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSuggester)),
        "ollama" => Ok(Arc::new(OllamaSuggester::new(config)?)),
        other => bail!("Unknown suggest provider: {}", other),
    }
}

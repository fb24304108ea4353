// src/fetch/chat.rs
//! Chat-completion client used by the summary generator. Requires
//! `OPENAI_API_KEY`. The model identifier and token ceiling are fixed; the
//! generator owns retries, so a single call here either yields a non-empty
//! reply or an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const CHAT_MODEL: &str = "gpt-4o-mini";
pub const MAX_COMPLETION_TOKENS: u32 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Submit a message list; returns the assistant reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub struct OpenAiChat {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiChat {
    /// `model_override`: pass Some("gpt-4o") to override the fixed default.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("pulseboard/0.1 (+github.com/lumlich/pulseboard)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(90))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or(CHAT_MODEL).to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatApi for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY not set");
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages,
            temperature: 0.7,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let resp = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("chat completion request")?;

        if !resp.status().is_success() {
            anyhow::bail!("chat api returned {}", resp.status());
        }

        let body: Resp = resp.json().await.context("chat completion body")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            anyhow::bail!("chat reply missing content");
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

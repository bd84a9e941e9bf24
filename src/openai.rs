//! Minimal OpenAI-compatible chat client.
//!
//! Only chat.completions with a system + user message pair. Calls log model names,
//! latency and response sizes, never the API key or full contents.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::AiServiceConfig;

#[derive(Debug, Error)]
pub enum AiError {
  #[error("chat request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("chat endpoint returned HTTP {status}: {message}")]
  Status { status: StatusCode, message: String },
  #[error("chat response had no choices")]
  EmptyChoices,
  #[error("model returned {got} answers for {expected} questions")]
  AnswerCount { expected: usize, got: usize },
  #[error("model reply did not contain a -X- answer: {0}")]
  Unparseable(String),
}

/// One system + user round trip returning the first choice's text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
  async fn chat(&self, system: &str, user: &str) -> Result<String, AiError>;
}

#[derive(Clone)]
pub struct OpenAI {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl OpenAI {
  pub fn new(cfg: &AiServiceConfig) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_seconds))
      .build()?;
    Ok(Self {
      client,
      api_key: cfg.api_key.clone(),
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    })
  }
}

#[async_trait]
impl ChatBackend for OpenAI {
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, prompt_len = user.len()))]
  async fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "autoword-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(AiError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      debug!(target: "ai", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .ok_or(AiError::EmptyChoices)?
      .message.content
      .unwrap_or_default();

    info!(target: "ai", elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

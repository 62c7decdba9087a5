//! Model Gateway: the one seam between lesson logic and the text-completion service.
//!
//! The production implementation calls an OpenAI-compatible chat.completions endpoint.
//! Calls are instrumented and log model names, latencies, and token usage (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::env_parse;
use crate::error::TutorError;
use crate::prompts::ChatMessage;

/// Accepts role-tagged messages, returns the first generated choice.
#[async_trait]
pub trait ModelGateway: Send + Sync {
  async fn complete(
    &self,
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
  ) -> Result<String, TutorError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let timeout = env_parse("OPENAI_TIMEOUT_SECS", 60u64);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string() })
  }
}

#[async_trait]
impl ModelGateway for OpenAI {
  #[instrument(level = "info", skip(self, messages), fields(model = %model, messages = messages.len()))]
  async fn complete(
    &self,
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
  ) -> Result<String, TutorError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest { model, messages, temperature };
    let start = Instant::now();

    let res = self.client.post(&url)
      .header(USER_AGENT, "tutor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| TutorError::ModelGateway(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "OpenAI call failed");
      return Err(TutorError::ModelGateway(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| TutorError::ModelGateway(format!("unreadable completion body: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
      .ok_or_else(|| TutorError::ModelGateway("no choices returned from model".into()))?;

    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  temperature: f32,
}

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

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn openai_error_message_is_extracted() {
    let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Incorrect API key provided"));
    assert_eq!(extract_openai_error("<html>bad gateway</html>"), None);
  }

  #[test]
  fn request_serializes_roles_in_lowercase() {
    let messages = vec![ChatMessage::system("be nice"), ChatMessage::user("hi")];
    let req = ChatCompletionRequest { model: "gpt-4o", messages: &messages, temperature: 0.1 };
    let v = serde_json::to_value(&req).expect("json");
    assert_eq!(v["messages"][0]["role"], "system");
    assert_eq!(v["messages"][1]["content"], "hi");
    assert_eq!(v["model"], "gpt-4o");
  }

  #[test]
  fn empty_choices_deserialize() {
    let body: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).expect("json");
    assert!(body.choices.is_empty());
  }
}

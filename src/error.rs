//! Error kinds surfaced by lesson turns and their HTTP mapping.

use axum::{
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extract::MalformedResponse;

#[derive(Debug, Error)]
pub enum TutorError {
  /// Required credential or setting is missing; raised before any model call.
  #[error("server configuration error: {0}")]
  Configuration(String),

  #[error("invalid request payload: {0}")]
  PayloadValidation(String),

  #[error("model gateway error: {0}")]
  ModelGateway(String),

  #[error("malformed model response: {0}")]
  MalformedResponse(#[from] MalformedResponse),

  /// Next-question generation after a correct answer failed. Recovered by the session.
  #[error("next question generation failed: {0}")]
  SecondaryGeneration(String),
}

impl TutorError {
  pub fn payload(message: impl Into<String>) -> Self {
    TutorError::PayloadValidation(message.into())
  }
}

impl From<JsonRejection> for TutorError {
  fn from(rejection: JsonRejection) -> Self {
    TutorError::PayloadValidation(rejection.body_text())
  }
}

impl From<QueryRejection> for TutorError {
  fn from(rejection: QueryRejection) -> Self {
    TutorError::PayloadValidation(rejection.body_text())
  }
}

impl IntoResponse for TutorError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      TutorError::Configuration(_) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "Server configuration error" }),
      ),
      TutorError::PayloadValidation(detail) => (
        StatusCode::BAD_REQUEST,
        json!({ "error": "Invalid request payload", "detail": detail }),
      ),
      TutorError::ModelGateway(detail) => (
        StatusCode::BAD_GATEWAY,
        json!({ "error": "Lesson generation failed", "detail": detail }),
      ),
      TutorError::MalformedResponse(m) => (
        StatusCode::BAD_GATEWAY,
        json!({ "error": "Invalid JSON from model", "detail": m.reason, "raw": m.raw, "cleaned": m.cleaned }),
      ),
      TutorError::SecondaryGeneration(detail) => (
        StatusCode::BAD_GATEWAY,
        json!({ "error": "Question generation failed", "detail": detail }),
      ),
    };
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::body::to_bytes;
  use serde_json::Value;

  async fn render(err: TutorError) -> (StatusCode, Value) {
    let resp = err.into_response();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    (status, serde_json::from_slice(&bytes).expect("json"))
  }

  #[tokio::test]
  async fn statuses_follow_error_kind() {
    let (status, body) = render(TutorError::Configuration("no key".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("detail").is_none());

    let (status, body) = render(TutorError::payload("grade is required")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "grade is required");

    let (status, _) = render(TutorError::ModelGateway("timeout".into())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (status, _) = render(TutorError::SecondaryGeneration("boom".into())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
  }

  #[tokio::test]
  async fn malformed_body_carries_raw_and_cleaned_text() {
    let raw = "```json\n{\"status\":\"pending\"}\n```";
    let err: TutorError = MalformedResponse::invalid_shape("missing question", raw).into();
    let (status, body) = render(err).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["raw"], raw);
    assert_eq!(body["cleaned"], "{\"status\":\"pending\"}");
    assert_eq!(body["detail"], "missing question");
  }
}

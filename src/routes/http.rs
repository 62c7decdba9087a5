//! HTTP endpoint handlers. These are thin wrappers that validate input and forward to the tutor.
//! Each handler is instrumented; failures map to JSON error bodies via `TutorError`.

use std::sync::Arc;

use axum::{
  extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::domain::SessionView;
use crate::error::TutorError;
use crate::prompts::TurnContext;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, model_gateway: state.tutor.is_configured() })
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_topics(
  State(state): State<Arc<AppState>>,
  query: Result<Query<TopicsQuery>, QueryRejection>,
) -> Result<Json<TopicsOut>, TutorError> {
  let Query(q) = query?;
  let grade = non_blank(q.grade).ok_or_else(|| TutorError::payload("grade is required"))?;
  let subject = non_blank(q.subject).unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
  let topics = state.tutor.topics(&grade, &subject).await?;
  info!(target: "lesson", %grade, %subject, count = topics.len(), "HTTP topics served");
  Ok(Json(TopicsOut { topics }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_lesson(
  State(state): State<Arc<AppState>>,
  body: Result<Json<LessonIn>, JsonRejection>,
) -> Result<Json<SessionView>, TutorError> {
  let Json(body) = body?;
  let req = body.validate(false)?;
  let view = state.tutor.lesson(&context(&req), req.reveal).await?;
  info!(target: "lesson", topic = %req.topic, turn = req.history.len(), status = view.status(), "HTTP lesson turn served");
  Ok(Json(view))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_generate_question(
  State(state): State<Arc<AppState>>,
  body: Result<Json<LessonIn>, JsonRejection>,
) -> Result<Json<SessionView>, TutorError> {
  let Json(body) = body?;
  let req = body.validate(true)?;
  let view = state.tutor.generate_question(&context(&req)).await?;
  info!(target: "lesson", topic = %req.topic, asked = req.history.len(), "HTTP question generated");
  Ok(Json(view))
}

fn context(req: &LessonRequest) -> TurnContext<'_> {
  TurnContext {
    subject: &req.subject,
    grade: &req.grade,
    topic: &req.topic,
    difficulty: req.difficulty,
    history: &req.history,
  }
}

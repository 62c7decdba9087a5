//! Lesson turns against the Model Gateway.
//!
//! Each operation builds prompts, calls the gateway with the right model and
//! temperature, runs the reply through the extractor, and checks the per-status
//! shape before handing back a `SessionView`. Nothing here holds session state;
//! see `session` for the state machine that drives these turns.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ModelProfile;
use crate::domain::{Question, SessionView};
use crate::error::TutorError;
use crate::extract::{extract_structured, parse_reply, MalformedResponse};
use crate::openai::ModelGateway;
use crate::prompts::{ChatMessage, PersonaTable, PromptBuilder, TurnContext, TurnKind};
use crate::util::trunc_for_log;

pub const MAX_TOPICS: usize = 12;

const LOG_PREVIEW: usize = 600;

#[derive(Clone, Copy, Debug)]
enum Purpose {
  Generate,
  Evaluate,
}

#[derive(Deserialize)]
struct PendingReply {
  #[serde(default)]
  status: Option<String>,
  #[serde(default)]
  explanation: String,
  question: Question,
}

#[derive(Deserialize)]
struct EvaluationReply {
  status: String,
  #[serde(default)]
  feedback: String,
  #[serde(default)]
  hint: String,
}

#[derive(Deserialize)]
struct RevealReply {
  #[serde(default)]
  status: Option<String>,
  #[serde(default)]
  solution: String,
  #[serde(rename = "nextQuestion")]
  next_question: Question,
}

/// Stateless lesson service shared by HTTP handlers and sessions.
#[derive(Clone)]
pub struct Tutor {
  gateway: Option<Arc<dyn ModelGateway>>,
  profile: ModelProfile,
  personas: PersonaTable,
}

impl Tutor {
  pub fn new(
    gateway: Option<Arc<dyn ModelGateway>>,
    profile: ModelProfile,
    personas: PersonaTable,
  ) -> Self {
    Self { gateway, profile, personas }
  }

  pub fn is_configured(&self) -> bool {
    self.gateway.is_some()
  }

  /// Classify the turn from history + reveal flag and run it.
  pub async fn lesson(&self, ctx: &TurnContext<'_>, reveal: bool) -> Result<SessionView, TutorError> {
    match TurnKind::classify(ctx.history.len(), reveal) {
      TurnKind::First => self.first_turn(ctx).await,
      TurnKind::FollowUp => self.evaluate(ctx).await,
      TurnKind::Reveal => {
        let previous = ctx.last_entry().map(|e| &e.question);
        self.reveal(ctx, previous).await
      }
    }
  }

  /// Topic introduction plus exactly one question.
  #[instrument(level = "info", skip(self, ctx), fields(subject = %ctx.subject, grade = %ctx.grade, topic = %ctx.topic))]
  pub async fn first_turn(&self, ctx: &TurnContext<'_>) -> Result<SessionView, TutorError> {
    let messages = PromptBuilder::new(&self.personas).build_messages(TurnKind::First, ctx);
    let raw = self.call(Purpose::Generate, &messages).await?;
    pending_view(&raw, None)
  }

  /// A fresh question on the same topic, avoiding everything already asked.
  #[instrument(level = "info", skip(self, ctx), fields(subject = %ctx.subject, topic = %ctx.topic, asked = ctx.history.len()))]
  pub async fn generate_question(&self, ctx: &TurnContext<'_>) -> Result<SessionView, TutorError> {
    let messages = PromptBuilder::new(&self.personas).question_messages(ctx);
    let raw = self.call(Purpose::Generate, &messages).await?;
    let previous = ctx.last_entry().map(|e| &e.question);
    pending_view(&raw, previous)
  }

  /// Judge the last history entry. Incorrect answers get the original question back,
  /// explanation included, no matter what the model echoed.
  #[instrument(level = "info", skip(self, ctx), fields(subject = %ctx.subject, topic = %ctx.topic, turn = ctx.history.len()))]
  pub async fn evaluate(&self, ctx: &TurnContext<'_>) -> Result<SessionView, TutorError> {
    let last = ctx
      .last_entry()
      .ok_or_else(|| TutorError::payload("history is empty; nothing to evaluate"))?;
    let messages = PromptBuilder::new(&self.personas).build_messages(TurnKind::FollowUp, ctx);
    let raw = self.call(Purpose::Evaluate, &messages).await?;

    let reply = parse_reply::<EvaluationReply>(&raw)?;
    let view = match reply.status.trim().to_ascii_lowercase().as_str() {
      "correct" => {
        let feedback = non_empty(reply.feedback, "correct reply has no feedback", &raw)?;
        SessionView::Correct { feedback, next_question: None, explanation: None }
      }
      "incorrect" => {
        let feedback = non_empty(reply.feedback, "incorrect reply has no feedback", &raw)?;
        let hint = non_empty(reply.hint, "incorrect reply has no hint", &raw)?;
        let explanation = last.context_explanation().map(str::to_string);
        let mut next_question = last.question.clone();
        next_question.explanation = explanation.clone();
        SessionView::Incorrect { feedback, hint, next_question, explanation }
      }
      other => {
        return Err(MalformedResponse::invalid_shape(
          format!("expected status 'correct' or 'incorrect', got '{other}'"),
          &raw,
        )
        .into())
      }
    };
    info!(target: "lesson", status = view.status(), "Answer evaluated");
    Ok(view)
  }

  /// Step-by-step solution plus a brand-new question.
  #[instrument(level = "info", skip(self, ctx, previous), fields(subject = %ctx.subject, topic = %ctx.topic))]
  pub async fn reveal(
    &self,
    ctx: &TurnContext<'_>,
    previous: Option<&Question>,
  ) -> Result<SessionView, TutorError> {
    if ctx.history.is_empty() {
      return Err(TutorError::payload("reveal requires at least one answered question"));
    }
    let messages = PromptBuilder::new(&self.personas).build_messages(TurnKind::Reveal, ctx);
    let raw = self.call(Purpose::Generate, &messages).await?;

    let reply = parse_reply::<RevealReply>(&raw)?;
    expect_status(reply.status.as_deref(), "revealed", &raw)?;
    let solution = non_empty(reply.solution, "revealed reply has no solution", &raw)?;
    let next_question = checked_question(reply.next_question, previous, &raw)?;
    Ok(SessionView::Revealed { solution, next_question })
  }

  /// Up to `MAX_TOPICS` unique, non-empty topic names for a grade and subject.
  #[instrument(level = "info", skip(self), fields(%grade, %subject))]
  pub async fn topics(&self, grade: &str, subject: &str) -> Result<Vec<String>, TutorError> {
    let messages = PromptBuilder::new(&self.personas).topic_messages(grade, subject);
    let raw = self.call(Purpose::Generate, &messages).await?;
    let value = extract_structured(&raw)?;
    let items = match &value {
      Value::Array(items) => items,
      Value::Object(map) => match map.get("topics") {
        Some(Value::Array(items)) => items,
        _ => return Err(MalformedResponse::invalid_shape("expected a topics array", &raw).into()),
      },
      _ => return Err(MalformedResponse::invalid_shape("expected a topics array", &raw).into()),
    };

    let mut seen = HashSet::new();
    let topics: Vec<String> = items
      .iter()
      .filter_map(Value::as_str)
      .map(str::trim)
      .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
      .take(MAX_TOPICS)
      .map(str::to_string)
      .collect();
    if topics.is_empty() {
      return Err(MalformedResponse::invalid_shape("topics array is empty", &raw).into());
    }
    info!(target: "lesson", count = topics.len(), "Topics generated");
    Ok(topics)
  }

  async fn call(&self, purpose: Purpose, messages: &[ChatMessage]) -> Result<String, TutorError> {
    let gateway = self.gateway.as_ref().ok_or_else(|| {
      TutorError::Configuration("OPENAI_API_KEY not set; model gateway disabled".into())
    })?;
    let (model, temperature) = match purpose {
      Purpose::Generate => (self.profile.model.as_str(), self.profile.gen_temperature),
      Purpose::Evaluate => (self.profile.eval_model.as_str(), self.profile.eval_temperature),
    };
    let start = Instant::now();
    let raw = gateway.complete(model, messages, temperature).await.map_err(|e| {
      warn!(target: "lesson", ?purpose, %model, elapsed = ?start.elapsed(), error = %e, "Model call failed");
      e
    })?;
    debug!(target: "lesson", ?purpose, %model, elapsed = ?start.elapsed(), raw = %trunc_for_log(&raw, LOG_PREVIEW), "Model reply");
    Ok(raw)
  }
}

fn pending_view(raw: &str, previous: Option<&Question>) -> Result<SessionView, TutorError> {
  let reply = parse_reply::<PendingReply>(raw)?;
  expect_status(reply.status.as_deref(), "pending", raw)?;
  let explanation = if reply.explanation.trim().is_empty() {
    reply.question.explanation.clone().unwrap_or_default()
  } else {
    reply.explanation
  };
  let explanation = non_empty(explanation, "pending reply has no explanation", raw)?;
  let mut question = checked_question(reply.question, previous, raw)?;
  question.explanation = Some(explanation.clone());
  Ok(SessionView::Pending { explanation, question })
}

/// Validate, normalize and (re)assign the id when missing or reused.
/// A prompt repeating the previous question's prompt is rejected.
fn checked_question(
  mut question: Question,
  previous: Option<&Question>,
  raw: &str,
) -> Result<Question, TutorError> {
  question.normalize();
  question
    .validate()
    .map_err(|reason| MalformedResponse::invalid_shape(reason, raw))?;
  if let Some(prev) = previous {
    if question.prompt.trim().to_lowercase() == prev.prompt.trim().to_lowercase() {
      return Err(MalformedResponse::invalid_shape("model repeated the previous question", raw).into());
    }
  }
  question.id = question.id.trim().to_string();
  if question.id.is_empty() || previous.map(|q| q.id.as_str()) == Some(question.id.as_str()) {
    question.id = Uuid::new_v4().to_string();
  }
  Ok(question)
}

fn expect_status(got: Option<&str>, want: &str, raw: &str) -> Result<(), TutorError> {
  match got {
    Some(s) if !s.eq_ignore_ascii_case(want) => Err(
      MalformedResponse::invalid_shape(format!("expected status '{want}', got '{s}'"), raw).into(),
    ),
    _ => Ok(()),
  }
}

fn non_empty(value: String, reason: &str, raw: &str) -> Result<String, TutorError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(MalformedResponse::invalid_shape(reason, raw).into());
  }
  Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, HistoryEntry, QuestionType};
  use crate::openai::fake::ScriptedGateway;
  use crate::prompts::Role;

  fn tutor(gateway: Arc<ScriptedGateway>) -> Tutor {
    Tutor::new(Some(gateway), ModelProfile::default(), PersonaTable::default())
  }

  fn numeric(id: &str, prompt: &str) -> Question {
    Question {
      id: id.into(),
      prompt: prompt.into(),
      kind: QuestionType::Numeric,
      options: vec![],
      explanation: None,
    }
  }

  fn ctx<'a>(history: &'a [HistoryEntry]) -> TurnContext<'a> {
    TurnContext {
      subject: "math",
      grade: "3",
      topic: "fractions",
      difficulty: Difficulty::Medium,
      history,
    }
  }

  const PENDING: &str = "```json\n{\"status\":\"pending\",\"explanation\":\"Pizza slices!\",\"question\":{\"id\":\"q1\",\"prompt\":\"What is 1/2 of 8?\",\"type\":\"numeric\"}}\n```";

  #[tokio::test]
  async fn first_turn_returns_pending_view_with_generation_profile() {
    let gw = Arc::new(ScriptedGateway::new().reply(PENDING));
    let view = tutor(gw.clone()).lesson(&ctx(&[]), false).await.expect("view");
    match &view {
      SessionView::Pending { explanation, question } => {
        assert_eq!(explanation, "Pizza slices!");
        assert_eq!(question.kind, QuestionType::Numeric);
        assert_eq!(question.explanation.as_deref(), Some("Pizza slices!"));
      }
      other => panic!("unexpected view {other:?}"),
    }
    let calls = gw.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].temperature, 0.7);
    assert_eq!(calls[0].model, ModelProfile::default().model);
    assert_eq!(calls[0].messages[0].role, Role::System);
  }

  #[tokio::test]
  async fn evaluation_status_is_case_insensitive() {
    let gw = Arc::new(
      ScriptedGateway::new()
        .reply(r#"{"status":"Correct","feedback":"Nice"}"#)
        .reply(r#"{"status":"INCORRECT","feedback":"No","hint":"Count the groups."}"#)
        .reply(r#"{"status":"maybe","feedback":"Hmm"}"#),
    );
    let history = vec![HistoryEntry { question: numeric("q1", "2+2?"), explanation: None, answer: "4".into() }];
    let t = tutor(gw);
    assert_eq!(t.evaluate(&ctx(&history)).await.expect("correct").status(), "correct");
    assert_eq!(t.evaluate(&ctx(&history)).await.expect("incorrect").status(), "incorrect");
    let err = t.evaluate(&ctx(&history)).await.expect_err("unknown status");
    assert!(matches!(err, TutorError::MalformedResponse(_)));
  }

  #[tokio::test]
  async fn incorrect_evaluation_reattaches_original_question() {
    let gw = Arc::new(ScriptedGateway::new().reply(
      r#"{"status":"incorrect","feedback":"Close!","hint":"Split 8 into two equal groups.","nextQuestion":{"prompt":"something else","type":"numeric"}}"#,
    ));
    let history = vec![HistoryEntry {
      question: numeric("q1", "What is 1/2 of 8?"),
      explanation: Some("Pizza slices!".into()),
      answer: "3".into(),
    }];
    let profile = ModelProfile { model: "gen-model".into(), eval_model: "eval-model".into(), ..ModelProfile::default() };
    let t = Tutor::new(Some(gw.clone()), profile, PersonaTable::default());
    let view = t.lesson(&ctx(&history), false).await.expect("view");
    match view {
      SessionView::Incorrect { hint, next_question, explanation, .. } => {
        assert_eq!(hint, "Split 8 into two equal groups.");
        assert_eq!(next_question.prompt, "What is 1/2 of 8?");
        assert_eq!(next_question.id, "q1");
        assert_eq!(next_question.explanation.as_deref(), Some("Pizza slices!"));
        assert_eq!(explanation.as_deref(), Some("Pizza slices!"));
      }
      other => panic!("unexpected view {other:?}"),
    }
    let calls = gw.calls();
    assert_eq!(calls[0].temperature, 0.1);
    assert_eq!(calls[0].model, "eval-model");
  }

  #[tokio::test]
  async fn incorrect_without_hint_is_malformed() {
    let gw = Arc::new(ScriptedGateway::new().reply(r#"{"status":"incorrect","feedback":"No"}"#));
    let history = vec![HistoryEntry { question: numeric("q1", "2+2?"), explanation: None, answer: "5".into() }];
    let err = tutor(gw).evaluate(&ctx(&history)).await.expect_err("malformed");
    assert!(matches!(err, TutorError::MalformedResponse(_)));
  }

  #[tokio::test]
  async fn reveal_assigns_fresh_id_when_model_reuses_it() {
    let gw = Arc::new(ScriptedGateway::new().reply(
      r#"Here you go: {"status":"revealed","solution":"8 split in 2 is 4.","nextQuestion":{"id":"q1","prompt":"What is 1/4 of 12?","type":"multiple-choice","options":["2","3","4"]}}"#,
    ));
    let history = vec![HistoryEntry { question: numeric("q1", "What is 1/2 of 8?"), explanation: None, answer: "3".into() }];
    let previous = history[0].question.clone();
    let view = tutor(gw).lesson(&ctx(&history), true).await.expect("view");
    match view {
      SessionView::Revealed { solution, next_question } => {
        assert_eq!(solution, "8 split in 2 is 4.");
        assert_ne!(next_question.id, previous.id);
        assert_eq!(next_question.options.len(), 3);
      }
      other => panic!("unexpected view {other:?}"),
    }
  }

  #[tokio::test]
  async fn repeated_prompt_is_rejected() {
    let gw = Arc::new(
      ScriptedGateway::new()
        .reply(r#"{"status":"revealed","solution":"4","nextQuestion":{"id":"q1","prompt":"What is 1/2 of 8?","type":"numeric"}}"#)
        .reply(r#"{"status":"pending","explanation":"Halves.","question":{"id":"q9","prompt":" what is 1/2 of 8? ","type":"numeric"}}"#),
    );
    let history = vec![HistoryEntry { question: numeric("q1", "What is 1/2 of 8?"), explanation: None, answer: "3".into() }];
    let t = tutor(gw);
    let err = t.lesson(&ctx(&history), true).await.expect_err("reveal repeat");
    assert!(matches!(err, TutorError::MalformedResponse(_)));
    let err = t.generate_question(&ctx(&history)).await.expect_err("question repeat");
    assert!(matches!(err, TutorError::MalformedResponse(_)));
  }

  #[tokio::test]
  async fn wrong_status_is_rejected() {
    let gw = Arc::new(ScriptedGateway::new().reply(
      r#"{"status":"correct","explanation":"x","question":{"prompt":"p","type":"numeric"}}"#,
    ));
    let err = tutor(gw).first_turn(&ctx(&[])).await.expect_err("status");
    assert!(matches!(err, TutorError::MalformedResponse(_)));
  }

  #[tokio::test]
  async fn topics_are_trimmed_deduplicated_and_capped() {
    let many: Vec<String> = (0..20).map(|i| format!("\"Topic {i}\"")).collect();
    let raw = format!("[\" Fractions \", \"fractions\", \"\", {}]", many.join(","));
    let gw = Arc::new(ScriptedGateway::new().reply(raw).reply(r#"{"topics": ["Plants"]}"#));
    let t = tutor(gw);
    let topics = t.topics("3", "math").await.expect("topics");
    assert_eq!(topics.len(), MAX_TOPICS);
    assert_eq!(topics[0], "Fractions");
    assert_eq!(topics[1], "Topic 0");
    assert_eq!(t.topics("3", "science").await.expect("topics"), vec!["Plants"]);
  }

  #[tokio::test]
  async fn unconfigured_gateway_fails_before_any_call() {
    let t = Tutor::new(None, ModelProfile::default(), PersonaTable::default());
    let err = t.first_turn(&ctx(&[])).await.expect_err("config");
    assert!(matches!(err, TutorError::Configuration(_)));
  }

  #[tokio::test]
  async fn gateway_failure_propagates() {
    let gw = Arc::new(ScriptedGateway::new().fail("HTTP 500"));
    let err = tutor(gw).first_turn(&ctx(&[])).await.expect_err("gateway");
    assert!(matches!(err, TutorError::ModelGateway(_)));
  }
}

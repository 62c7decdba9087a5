//! Per-topic lesson session: history, score and the turn state machine.
//!
//! A session is created by `start` and replaced whenever subject, grade or topic
//! change. State is only committed after a turn's reply parsed successfully, so a
//! failed or abandoned turn leaves the session exactly as it was.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{HistoryEntry, Question, ScoreState, SessionView};
use crate::error::TutorError;
use crate::lesson::Tutor;
use crate::prompts::TurnContext;

/// Incorrect attempts on the same question before a reveal is allowed.
pub const REVEAL_AFTER: u32 = 2;

#[derive(Clone, Debug)]
pub struct Session {
  subject: String,
  grade: String,
  topic: String,
  history: Vec<HistoryEntry>,
  score: ScoreState,
  incorrect_attempts: u32,
  view: SessionView,
}

/// Snapshot sent to clients along with each view.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
  pub score: ScoreState,
  pub incorrect_attempts: u32,
  pub can_reveal: bool,
  /// Badges unlocked by the turn that produced this snapshot.
  pub new_badges: Vec<u32>,
}

impl Session {
  /// Fresh history and score, then a `first` turn.
  #[instrument(level = "info", skip(tutor))]
  pub async fn start(
    tutor: &Tutor,
    subject: &str,
    grade: &str,
    topic: &str,
  ) -> Result<Self, TutorError> {
    let subject = required("subject", subject)?;
    let grade = required("grade", grade)?;
    let topic = required("topic", topic)?;
    let score = ScoreState::default();

    let view = tutor
      .first_turn(&TurnContext {
        subject: &subject,
        grade: &grade,
        topic: &topic,
        difficulty: score.difficulty,
        history: &[],
      })
      .await?;
    info!(target: "lesson", %subject, %grade, %topic, "Session started");

    Ok(Self {
      subject,
      grade,
      topic,
      history: Vec::new(),
      score,
      incorrect_attempts: 0,
      view,
    })
  }

  pub fn view(&self) -> &SessionView {
    &self.view
  }

  pub fn current_question(&self) -> Option<&Question> {
    self.view.question_to_show()
  }

  pub fn can_reveal(&self) -> bool {
    self.incorrect_attempts >= REVEAL_AFTER
  }

  pub fn snapshot(&self, new_badges: Vec<u32>) -> SessionSnapshot {
    SessionSnapshot {
      score: self.score.clone(),
      incorrect_attempts: self.incorrect_attempts,
      can_reveal: self.can_reveal(),
      new_badges,
    }
  }

  /// Evaluate an answer to the displayed question. On a correct answer a fresh
  /// question is requested; if that secondary call fails the evaluation is still
  /// returned, just without a next question.
  ///
  /// Returns the badges unlocked by this answer.
  #[instrument(level = "info", skip(self, tutor, answer), fields(topic = %self.topic, turn = self.history.len() + 1))]
  pub async fn submit_answer(&mut self, tutor: &Tutor, answer: &str) -> Result<Vec<u32>, TutorError> {
    let answer = required("answer", answer)?;
    let question = self
      .current_question()
      .cloned()
      .ok_or_else(|| TutorError::payload("no question is currently displayed"))?;
    let entry = HistoryEntry {
      explanation: self.view.explanation().map(str::to_string),
      question,
      answer,
    };

    let mut history = self.history.clone();
    history.push(entry);
    let evaluation = tutor.evaluate(&self.context(&history)).await?;

    // Reply parsed: commit.
    self.history = history;
    let correct = matches!(evaluation, SessionView::Correct { .. });
    let new_badges = self.score.record(correct);
    if !new_badges.is_empty() {
      info!(target: "lesson", badges = ?new_badges, "Badges unlocked");
    }

    self.view = match evaluation {
      SessionView::Correct { feedback, .. } => {
        self.incorrect_attempts = 0;
        let (next_question, explanation) = match self.fetch_next_question(tutor).await {
          Ok((q, e)) => (Some(q), Some(e)),
          Err(e) => {
            warn!(target: "lesson", error = %e, "Returning evaluation without a next question");
            (None, None)
          }
        };
        SessionView::Correct { feedback, next_question, explanation }
      }
      other => {
        self.incorrect_attempts += 1;
        other
      }
    };
    info!(
      target: "lesson",
      status = self.view.status(),
      correct = self.score.correct_count,
      total = self.score.total_count,
      difficulty = self.score.difficulty.as_str(),
      "Answer recorded"
    );
    Ok(new_badges)
  }

  /// Solution for the displayed question plus a new one. Requires `can_reveal()`.
  #[instrument(level = "info", skip(self, tutor), fields(topic = %self.topic))]
  pub async fn reveal(&mut self, tutor: &Tutor) -> Result<(), TutorError> {
    if !self.can_reveal() {
      return Err(TutorError::payload(format!(
        "reveal is available after {REVEAL_AFTER} incorrect attempts ({} so far)",
        self.incorrect_attempts
      )));
    }
    let previous = self.current_question().cloned();
    let view = tutor.reveal(&self.context(&self.history), previous.as_ref()).await?;
    self.incorrect_attempts = 0;
    self.view = view;
    Ok(())
  }

  /// Re-request a question when a correct evaluation came back without one.
  /// History and score are left alone.
  #[instrument(level = "info", skip(self, tutor), fields(topic = %self.topic))]
  pub async fn next_question(&mut self, tutor: &Tutor) -> Result<(), TutorError> {
    if self.current_question().is_some() {
      return Err(TutorError::payload("a question is already displayed"));
    }
    let view = tutor
      .generate_question(&self.context(&self.history))
      .await
      .map_err(|e| TutorError::SecondaryGeneration(e.to_string()))?;
    self.view = view;
    Ok(())
  }

  async fn fetch_next_question(&self, tutor: &Tutor) -> Result<(Question, String), TutorError> {
    let view = tutor
      .generate_question(&self.context(&self.history))
      .await
      .map_err(|e| TutorError::SecondaryGeneration(e.to_string()))?;
    match view {
      SessionView::Pending { explanation, question } => Ok((question, explanation)),
      other => Err(TutorError::SecondaryGeneration(format!(
        "unexpected status '{}'",
        other.status()
      ))),
    }
  }

  fn context<'a>(&'a self, history: &'a [HistoryEntry]) -> TurnContext<'a> {
    TurnContext {
      subject: &self.subject,
      grade: &self.grade,
      topic: &self.topic,
      difficulty: self.score.difficulty,
      history,
    }
  }
}

fn required(field: &str, value: &str) -> Result<String, TutorError> {
  let v = value.trim();
  if v.is_empty() {
    return Err(TutorError::payload(format!("{field} is required")));
  }
  Ok(v.to_string())
}

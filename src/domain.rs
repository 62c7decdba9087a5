//! Domain models: questions, history entries, the client-visible lesson view and score state.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// How the student is expected to answer a question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuestionType {
  #[serde(rename = "numeric")]
  Numeric,
  #[serde(rename = "multiple-choice", alias = "mcq", alias = "multiple_choice")]
  MultipleChoice,
  #[serde(rename = "free-text", alias = "text", alias = "free_text")]
  FreeText,
}

/// A practice question as produced by the model and shown to the student.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  #[serde(default, deserialize_with = "string_or_number")]
  pub id: String,
  pub prompt: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  /// Only meaningful (and only serialized) for multiple-choice questions.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  /// Carried along so a re-presented question stays self-contained.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
}

impl Question {
  /// Structural check applied to every question crossing the model boundary.
  pub fn validate(&self) -> Result<(), String> {
    if self.prompt.trim().is_empty() {
      return Err("question.prompt is empty".into());
    }
    if self.kind == QuestionType::MultipleChoice
      && self.options.iter().all(|o| o.trim().is_empty())
    {
      return Err("multiple-choice question has no options".into());
    }
    Ok(())
  }

  /// Drop options that do not belong to the question type.
  pub fn normalize(&mut self) {
    if self.kind == QuestionType::MultipleChoice {
      self.options.retain(|o| !o.trim().is_empty());
    } else {
      self.options.clear();
    }
  }
}

/// One completed turn. Appended to the session history and never touched again.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
  pub question: Question,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
  #[serde(deserialize_with = "string_or_number")]
  pub answer: String,
}

impl HistoryEntry {
  /// Explanation that accompanied the question, wherever it was recorded.
  pub fn context_explanation(&self) -> Option<&str> {
    self
      .explanation
      .as_deref()
      .or(self.question.explanation.as_deref())
      .filter(|s| !s.trim().is_empty())
  }
}

/// What the caller sees after each turn, discriminated by `status`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionView {
  Pending {
    explanation: String,
    question: Question,
  },
  Correct {
    feedback: String,
    #[serde(rename = "nextQuestion", default, skip_serializing_if = "Option::is_none")]
    next_question: Option<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
  },
  Incorrect {
    feedback: String,
    hint: String,
    #[serde(rename = "nextQuestion")]
    next_question: Question,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
  },
  Revealed {
    solution: String,
    #[serde(rename = "nextQuestion")]
    next_question: Question,
  },
}

impl SessionView {
  /// The question currently on screen: `nextQuestion` if present, else `question`.
  pub fn question_to_show(&self) -> Option<&Question> {
    match self {
      SessionView::Pending { question, .. } => Some(question),
      SessionView::Correct { next_question, .. } => next_question.as_ref(),
      SessionView::Incorrect { next_question, .. } => Some(next_question),
      SessionView::Revealed { next_question, .. } => Some(next_question),
    }
  }

  /// Explanation attached to the displayed question, if any.
  pub fn explanation(&self) -> Option<&str> {
    let own = match self {
      SessionView::Pending { explanation, .. } => Some(explanation.as_str()),
      SessionView::Correct { explanation, .. } | SessionView::Incorrect { explanation, .. } => {
        explanation.as_deref()
      }
      SessionView::Revealed { .. } => None,
    };
    own
      .filter(|s| !s.trim().is_empty())
      .or_else(|| self.question_to_show().and_then(|q| q.explanation.as_deref()))
  }

  pub fn status(&self) -> &'static str {
    match self {
      SessionView::Pending { .. } => "pending",
      SessionView::Correct { .. } => "correct",
      SessionView::Incorrect { .. } => "incorrect",
      SessionView::Revealed { .. } => "revealed",
    }
  }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// Running score for one session. Badges are correct-count thresholds.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreState {
  pub correct_count: u32,
  pub total_count: u32,
  pub difficulty: Difficulty,
  pub badges: BTreeSet<u32>,
}

/// Models and callers sometimes send ids/grades/answers as bare numbers.
pub fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Str(String),
    Int(i64),
    Float(f64),
    Null(()),
  }
  Ok(match Raw::deserialize(de)? {
    Raw::Str(s) => s,
    Raw::Null(()) => String::new(),
    Raw::Int(n) => n.to_string(),
    Raw::Float(f) => f.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn question_accepts_legacy_type_names_and_numeric_ids() {
    let q: Question = serde_json::from_value(json!({
      "id": 7, "prompt": "Pick one", "type": "mcq", "options": ["a", "b"]
    }))
    .expect("question");
    assert_eq!(q.id, "7");
    assert_eq!(q.kind, QuestionType::MultipleChoice);

    let q: Question =
      serde_json::from_value(json!({ "prompt": "Say hi", "type": "text" })).expect("question");
    assert_eq!(q.kind, QuestionType::FreeText);
    assert!(q.id.is_empty());
  }

  #[test]
  fn multiple_choice_without_options_is_rejected() {
    let q = Question {
      id: "q1".into(),
      prompt: "Which?".into(),
      kind: QuestionType::MultipleChoice,
      options: vec!["  ".into()],
      explanation: None,
    };
    assert!(q.validate().is_err());
  }

  #[test]
  fn normalize_drops_options_on_numeric_questions() {
    let mut q = Question {
      id: "q1".into(),
      prompt: "2+2?".into(),
      kind: QuestionType::Numeric,
      options: vec!["4".into()],
      explanation: None,
    };
    q.normalize();
    assert!(q.options.is_empty());
    let v = serde_json::to_value(&q).expect("json");
    assert!(v.get("options").is_none());
  }

  #[test]
  fn view_serializes_with_status_tag_and_camel_case_question() {
    let view = SessionView::Incorrect {
      feedback: "Not quite".into(),
      hint: "Count again".into(),
      next_question: Question {
        id: "q1".into(),
        prompt: "3+4?".into(),
        kind: QuestionType::Numeric,
        options: vec![],
        explanation: Some("Adding".into()),
      },
      explanation: Some("Adding".into()),
    };
    let v = serde_json::to_value(&view).expect("json");
    assert_eq!(v["status"], "incorrect");
    assert_eq!(v["nextQuestion"]["prompt"], "3+4?");
    assert_eq!(v["nextQuestion"]["type"], "numeric");
  }

  #[test]
  fn question_to_show_prefers_next_question() {
    let q = Question {
      id: "a".into(),
      prompt: "p".into(),
      kind: QuestionType::FreeText,
      options: vec![],
      explanation: None,
    };
    let pending = SessionView::Pending { explanation: "e".into(), question: q.clone() };
    assert_eq!(pending.question_to_show(), Some(&q));
    let correct = SessionView::Correct { feedback: "ok".into(), next_question: None, explanation: None };
    assert!(correct.question_to_show().is_none());
  }

  #[test]
  fn history_entry_falls_back_to_question_explanation() {
    let entry = HistoryEntry {
      question: Question {
        id: "a".into(),
        prompt: "p".into(),
        kind: QuestionType::Numeric,
        options: vec![],
        explanation: Some("from question".into()),
      },
      explanation: None,
      answer: "3".into(),
    };
    assert_eq!(entry.context_explanation(), Some("from question"));
  }
}

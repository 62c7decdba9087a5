//! Prompt construction for every kind of model call.
//!
//! Subject-specific wording comes from a persona table keyed by subject id. The
//! table only distinguishes language-learning subjects from knowledge subjects;
//! everything else is parameterized by grade, topic and difficulty.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::TutorConfig;
use crate::domain::{Difficulty, HistoryEntry};
use crate::util::fill_template;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
}

/// Which lifecycle event a lesson request represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnKind {
  First,
  FollowUp,
  Reveal,
}

impl TurnKind {
  pub fn classify(history_len: usize, reveal: bool) -> Self {
    match (history_len, reveal) {
      (0, _) => TurnKind::First,
      (_, true) => TurnKind::Reveal,
      _ => TurnKind::FollowUp,
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
  Knowledge,
  Language,
}

/// Phrasing for one family of subjects. `{subject}` and `{grade}` are filled in.
struct PersonaText {
  tutor: &'static str,
  focus: &'static str,
  question_focus: &'static str,
}

const KNOWLEDGE_PERSONA: PersonaText = PersonaText {
  tutor: "You are a playful, engaging {subject} tutor for {grade}th-graders.",
  focus: "Focus on reinforcing basic concepts with age-appropriate language and real-world contexts.",
  question_focus: "The question should check fundamental understanding using a brief real-world example or a basic drill.",
};

const LANGUAGE_PERSONA: PersonaText = PersonaText {
  tutor: "You are a playful, engaging {subject} tutor for {grade}th-grade English speakers learning {subject}.",
  focus: "Focus on reinforcing {subject} language concepts with English explanations and {subject} content with translations. Use real-world contexts that help English speakers understand {subject}.",
  question_focus: "The question should help English speakers practice {subject} with practical examples.",
};

const STYLE_LINE: &str = "Make explanations fun: use characters, stories, or mini-scenes.";
const JSON_ONLY_LINE: &str = "Always respond with JSON only; no extra text.";

const QUESTION_SHAPE: &str = r#"{
  "id": "…string…",
  "prompt": "…string…",
  "type": "numeric" | "multiple-choice" | "free-text",
  "options": ["…string…"]   // only for multiple-choice
}"#;

#[derive(Clone, Debug)]
pub struct Persona {
  pub kind: SubjectKind,
  pub label: String,
}

impl Persona {
  fn text(&self) -> &'static PersonaText {
    match self.kind {
      SubjectKind::Knowledge => &KNOWLEDGE_PERSONA,
      SubjectKind::Language => &LANGUAGE_PERSONA,
    }
  }
}

/// Subject id → persona. Unknown subjects are treated as knowledge subjects.
#[derive(Clone, Debug)]
pub struct PersonaTable {
  by_subject: HashMap<String, Persona>,
}

impl Default for PersonaTable {
  fn default() -> Self {
    let builtin = [
      ("math", SubjectKind::Knowledge, "math"),
      ("science", SubjectKind::Knowledge, "science"),
      ("english", SubjectKind::Knowledge, "English"),
      ("spanish", SubjectKind::Language, "Spanish"),
      ("hindi", SubjectKind::Language, "Hindi"),
    ];
    let by_subject = builtin
      .into_iter()
      .map(|(id, kind, label)| (id.to_string(), Persona { kind, label: label.to_string() }))
      .collect();
    Self { by_subject }
  }
}

impl PersonaTable {
  /// Built-in table extended (and overridden) by config entries.
  pub fn from_config(cfg: Option<&TutorConfig>) -> Self {
    let mut table = Self::default();
    for s in cfg.map(|c| c.subjects.as_slice()).unwrap_or_default() {
      let label = s.label.clone().unwrap_or_else(|| s.id.clone());
      table
        .by_subject
        .insert(s.id.trim().to_lowercase(), Persona { kind: s.kind, label });
    }
    table
  }

  pub fn lookup(&self, subject: &str) -> Persona {
    let key = subject.trim().to_lowercase();
    self.by_subject.get(&key).cloned().unwrap_or(Persona {
      kind: SubjectKind::Knowledge,
      label: subject.trim().to_string(),
    })
  }
}

pub fn difficulty_directive(difficulty: Difficulty) -> &'static str {
  match difficulty {
    Difficulty::Easy => "Generate EASIER questions with simpler concepts, smaller numbers, basic vocabulary, and more straightforward problems. Provide extra hints and encouragement.",
    Difficulty::Medium => "Generate questions at a moderate difficulty level appropriate for the grade level.",
    Difficulty::Hard => "Generate CHALLENGING questions with more complex concepts, larger numbers, advanced vocabulary, and multi-step problems that require deeper thinking.",
  }
}

/// Everything a prompt may depend on.
#[derive(Clone, Copy, Debug)]
pub struct TurnContext<'a> {
  pub subject: &'a str,
  pub grade: &'a str,
  pub topic: &'a str,
  pub difficulty: Difficulty,
  pub history: &'a [HistoryEntry],
}

impl<'a> TurnContext<'a> {
  pub fn last_entry(&self) -> Option<&'a HistoryEntry> {
    self.history.last()
  }

  fn previous_prompts(&self) -> Vec<&'a str> {
    self
      .history
      .iter()
      .map(|e| e.question.prompt.as_str())
      .filter(|p| !p.trim().is_empty())
      .collect()
  }
}

pub struct PromptBuilder<'t> {
  personas: &'t PersonaTable,
}

impl<'t> PromptBuilder<'t> {
  pub fn new(personas: &'t PersonaTable) -> Self {
    Self { personas }
  }

  /// Messages for one lesson turn.
  pub fn build_messages(&self, kind: TurnKind, ctx: &TurnContext<'_>) -> Vec<ChatMessage> {
    match (kind, ctx.last_entry()) {
      (TurnKind::FollowUp, Some(last)) => self.follow_up(ctx, last),
      (TurnKind::Reveal, Some(last)) => self.reveal(ctx, last),
      _ => self.first(ctx),
    }
  }

  /// Messages for a fresh question on the current topic (after a correct answer).
  pub fn question_messages(&self, ctx: &TurnContext<'_>) -> Vec<ChatMessage> {
    let persona = self.personas.lookup(ctx.subject);
    let user = [
      format!(
        "Generate a new question on the {} topic \"{}\" for a {}th-grade student.",
        persona.label, ctx.topic, ctx.grade
      ),
      self.fill(&persona, ctx, persona.text().question_focus),
      dedup_line(ctx),
      "Return exactly this JSON shape (no fences):".into(),
      pending_shape(),
    ];
    vec![self.system(&persona, ctx), ChatMessage::user(join_lines(&user))]
  }

  /// Messages asking for the topic list of a grade.
  pub fn topic_messages(&self, grade: &str, subject: &str) -> Vec<ChatMessage> {
    let persona = self.personas.lookup(subject);
    vec![
      ChatMessage::system(format!(
        "You are an elementary {} curriculum planner. {}",
        persona.label, JSON_ONLY_LINE
      )),
      ChatMessage::user(format!(
        "List up to 12 key topics for grade {} {} as a JSON array of short, distinct strings.",
        grade, persona.label
      )),
    ]
  }

  fn first(&self, ctx: &TurnContext<'_>) -> Vec<ChatMessage> {
    let persona = self.personas.lookup(ctx.subject);
    let user = [
      format!(
        "Introduce the concept \"{}\" with a 1-sentence mini-story or analogy a {}th-grader will love.",
        ctx.topic, ctx.grade
      ),
      "Then give exactly one practice question. Alternate between creative real-world problems and basic drills.".into(),
      dedup_line(ctx),
      "Return exactly this JSON shape (no fences):".into(),
      pending_shape(),
    ];
    vec![self.system(&persona, ctx), ChatMessage::user(join_lines(&user))]
  }

  fn follow_up(&self, ctx: &TurnContext<'_>, last: &HistoryEntry) -> Vec<ChatMessage> {
    let persona = self.personas.lookup(ctx.subject);
    let question = self_contained_question_json(last);
    let system = [
      self.fill(&persona, ctx, persona.text().tutor),
      "You judge the student's last answer. Based on it, infer the likely mistake and give a diagnostic hint.".into(),
      "For incorrect answers, nextQuestion MUST be the original question object copied verbatim, including its explanation.".into(),
      difficulty_directive(ctx.difficulty).into(),
      JSON_ONLY_LINE.into(),
    ];
    let user = [
      format!("Topic: \"{}\".", ctx.topic),
      "Here is the last question (with its explanation) and the student's answer:".into(),
      question.clone(),
      format!("Student answered: \"{}\"", last.answer),
      String::new(),
      "If correct, return:".into(),
      r#"{
  "status": "correct",
  "feedback": "…short praise…"
}"#
        .into(),
      String::new(),
      "If incorrect, return JSON where \"hint\" is a diagnostic tip and \"nextQuestion\" repeats the entire question object above:".into(),
      format!(
        "{{\n  \"status\": \"incorrect\",\n  \"feedback\": \"…encouraging correction…\",\n  \"hint\": \"…diagnostic hint…\",\n  \"nextQuestion\": {question}\n}}"
      ),
      String::new(),
      "Do not include anything outside the JSON object.".into(),
    ];
    vec![ChatMessage::system(join_lines(&system)), ChatMessage::user(join_lines(&user))]
  }

  fn reveal(&self, ctx: &TurnContext<'_>, last: &HistoryEntry) -> Vec<ChatMessage> {
    let persona = self.personas.lookup(ctx.subject);
    let user = [
      "The student is stuck on this question and asked to see the answer:".into(),
      self_contained_question_json(last),
      format!("Their last attempt was: \"{}\"", last.answer),
      "Explain the solution step by step in kid-friendly language, then give a brand-new question on the same topic.".into(),
      dedup_line(ctx),
      "Return exactly this JSON shape (no fences):".into(),
      format!(
        "{{\n  \"status\": \"revealed\",\n  \"solution\": \"…step-by-step solution…\",\n  \"nextQuestion\": {QUESTION_SHAPE}\n}}"
      ),
    ];
    vec![self.system(&persona, ctx), ChatMessage::user(join_lines(&user))]
  }

  fn system(&self, persona: &Persona, ctx: &TurnContext<'_>) -> ChatMessage {
    let text = persona.text();
    let lines = [
      self.fill(persona, ctx, text.tutor),
      self.fill(persona, ctx, text.focus),
      STYLE_LINE.into(),
      difficulty_directive(ctx.difficulty).into(),
      JSON_ONLY_LINE.into(),
    ];
    ChatMessage::system(lines.join(" "))
  }

  fn fill(&self, persona: &Persona, ctx: &TurnContext<'_>, tpl: &str) -> String {
    fill_template(tpl, &[("subject", persona.label.as_str()), ("grade", ctx.grade)])
  }
}

fn pending_shape() -> String {
  format!(
    "{{\n  \"status\": \"pending\",\n  \"explanation\": \"…string…\",\n  \"question\": {QUESTION_SHAPE}\n}}"
  )
}

/// Empty when there is nothing to avoid.
fn dedup_line(ctx: &TurnContext<'_>) -> String {
  let previous = ctx.previous_prompts();
  if previous.is_empty() {
    return String::new();
  }
  format!(
    "IMPORTANT: Avoid repeating these previously asked questions: {}. Create a completely different question on the same topic.",
    previous.join("; ")
  )
}

/// The last question with the entry's explanation folded in.
fn self_contained_question_json(last: &HistoryEntry) -> String {
  let mut question = last.question.clone();
  if let Some(exp) = last.context_explanation() {
    question.explanation = Some(exp.to_string());
  }
  serde_json::to_string_pretty(&question).unwrap_or_else(|_| question.prompt.clone())
}

fn join_lines(lines: &[String]) -> String {
  lines
    .iter()
    .enumerate()
    .filter(|(i, l)| !l.is_empty() || (*i > 0 && !lines[i - 1].is_empty()))
    .map(|(_, l)| l.as_str())
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Question, QuestionType};

  fn entry(prompt: &str, explanation: Option<&str>) -> HistoryEntry {
    HistoryEntry {
      question: Question {
        id: "q1".into(),
        prompt: prompt.into(),
        kind: QuestionType::Numeric,
        options: vec![],
        explanation: None,
      },
      explanation: explanation.map(Into::into),
      answer: "7".into(),
    }
  }

  fn ctx<'a>(subject: &'a str, history: &'a [HistoryEntry], difficulty: Difficulty) -> TurnContext<'a> {
    TurnContext { subject, grade: "3", topic: "fractions", difficulty, history }
  }

  #[test]
  fn classify_turns() {
    assert_eq!(TurnKind::classify(0, true), TurnKind::First);
    assert_eq!(TurnKind::classify(2, true), TurnKind::Reveal);
    assert_eq!(TurnKind::classify(2, false), TurnKind::FollowUp);
  }

  #[test]
  fn persona_lookup_distinguishes_language_subjects() {
    let table = PersonaTable::default();
    assert_eq!(table.lookup("Spanish").kind, SubjectKind::Language);
    assert_eq!(table.lookup("math").kind, SubjectKind::Knowledge);
    let unknown = table.lookup("astronomy");
    assert_eq!(unknown.kind, SubjectKind::Knowledge);
    assert_eq!(unknown.label, "astronomy");
  }

  #[test]
  fn config_subjects_extend_the_table() {
    let cfg: TutorConfig =
      toml::from_str("[[subjects]]\nid = \"French\"\nkind = \"language\"\n").expect("toml");
    let table = PersonaTable::from_config(Some(&cfg));
    assert_eq!(table.lookup("french").kind, SubjectKind::Language);
  }

  #[test]
  fn first_turn_has_persona_difficulty_and_pending_shape() {
    let table = PersonaTable::default();
    let builder = PromptBuilder::new(&table);
    let msgs = builder.build_messages(TurnKind::First, &ctx("hindi", &[], Difficulty::Easy));
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0].role, Role::System);
    assert!(msgs[0].content.contains("English speakers learning Hindi"));
    assert!(msgs[0].content.contains("EASIER"));
    assert!(msgs[1].content.contains("\"status\": \"pending\""));
    assert!(!msgs[1].content.contains("Avoid repeating"));
  }

  #[test]
  fn follow_up_embeds_question_with_explanation_verbatim() {
    let table = PersonaTable::default();
    let builder = PromptBuilder::new(&table);
    let history = vec![entry("What is 3 + 4?", Some("Adding means combining."))];
    let msgs = builder.build_messages(TurnKind::FollowUp, &ctx("math", &history, Difficulty::Medium));
    let user = &msgs[1].content;
    assert!(user.contains("What is 3 + 4?"));
    assert!(user.contains("Adding means combining."));
    assert!(user.contains("Student answered: \"7\""));
    assert!(user.contains("\"status\": \"incorrect\""));
    assert!(msgs[0].content.contains("verbatim"));
  }

  #[test]
  fn reveal_and_question_prompts_list_previous_questions() {
    let table = PersonaTable::default();
    let builder = PromptBuilder::new(&table);
    let history = vec![entry("What is 1/2 of 8?", None), entry("What is 1/4 of 8?", None)];
    let c = ctx("math", &history, Difficulty::Hard);

    let reveal = builder.build_messages(TurnKind::Reveal, &c);
    assert!(reveal[1].content.contains("\"status\": \"revealed\""));
    assert!(reveal[1].content.contains("What is 1/2 of 8?; What is 1/4 of 8?"));

    let fresh = builder.question_messages(&c);
    assert!(fresh[0].content.contains("CHALLENGING"));
    assert!(fresh[1].content.contains("Avoid repeating"));
  }

  #[test]
  fn topic_prompt_asks_for_array() {
    let table = PersonaTable::default();
    let msgs = PromptBuilder::new(&table).topic_messages("4", "science");
    assert!(msgs[1].content.contains("grade 4 science"));
    assert!(msgs[1].content.contains("JSON array"));
  }
}

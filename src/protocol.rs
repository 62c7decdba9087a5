//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{string_or_number, Difficulty, HistoryEntry, SessionView};
use crate::error::TutorError;
use crate::session::SessionSnapshot;

/// Subject used when the caller does not name one.
pub const DEFAULT_SUBJECT: &str = "math";

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Topics {
        #[serde(deserialize_with = "string_or_number")]
        grade: String,
        #[serde(default)]
        subject: Option<String>,
    },
    Start {
        #[serde(deserialize_with = "string_or_number")]
        grade: String,
        #[serde(default)]
        subject: Option<String>,
        topic: String,
    },
    SubmitAnswer {
        #[serde(deserialize_with = "string_or_number")]
        answer: String,
    },
    Reveal,
    NextQuestion,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Topics {
        topics: Vec<String>,
    },
    Lesson {
        view: SessionView,
        session: SessionSnapshot,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct TopicsQuery {
    pub grade: Option<String>,
    pub subject: Option<String>,
}
#[derive(Debug, Serialize)]
pub struct TopicsOut {
    pub topics: Vec<String>,
}

/// Body of `POST /lesson` and `POST /generate-question`.
#[derive(Debug, Deserialize)]
pub struct LessonIn {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub grade: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub reveal: bool,
}

/// `LessonIn` after field checks.
#[derive(Debug)]
pub struct LessonRequest {
    pub grade: String,
    pub subject: String,
    pub topic: String,
    pub history: Vec<HistoryEntry>,
    pub difficulty: Difficulty,
    pub reveal: bool,
}

impl LessonIn {
    pub fn validate(self, require_subject: bool) -> Result<LessonRequest, TutorError> {
        let grade = non_blank(self.grade).ok_or_else(|| TutorError::payload("grade is required"))?;
        let topic = non_blank(self.topic).ok_or_else(|| TutorError::payload("topic is required"))?;
        let subject = match non_blank(self.subject) {
            Some(s) => s,
            None if require_subject => return Err(TutorError::payload("subject is required")),
            None => DEFAULT_SUBJECT.to_string(),
        };
        let history = self
            .history
            .ok_or_else(|| TutorError::payload("history must be an array"))?;
        Ok(LessonRequest {
            grade,
            subject,
            topic,
            history,
            difficulty: self.difficulty.unwrap_or_default(),
            reveal: self.reveal,
        })
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub model_gateway: bool,
}

pub fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn opt_string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "string_or_number")] String);
    Ok(Option::<Wrap>::deserialize(de)?.map(|w| w.0))
}

//! WebSocket upgrade + message loop. Each connection owns at most one lesson
//! `Session`; messages are handled one at a time, so the session has a single writer.
//! We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::TutorError;
use crate::protocol::{ClientWsMessage, ServerWsMessage, DEFAULT_SUBJECT};
use crate::session::Session;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "tutor_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "tutor_backend", "WebSocket connected");
  let mut session: Option<Session> = None;

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "tutor_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &mut session)
              .await
              .unwrap_or_else(|e| {
                error!(target: "lesson", error = %e, "WS turn failed");
                ServerWsMessage::Error { message: e.to_string() }
              })
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "tutor_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "tutor_backend", "WebSocket disconnected");
}

async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &mut Option<Session>,
) -> Result<ServerWsMessage, TutorError> {
  let tutor = &state.tutor;
  match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::Topics { grade, subject } => {
      let subject = subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
      let topics = tutor.topics(&grade, &subject).await?;
      Ok(ServerWsMessage::Topics { topics })
    }

    ClientWsMessage::Start { grade, subject, topic } => {
      let subject = subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
      // The previous session is only replaced once the new one started.
      let fresh = Session::start(tutor, &subject, &grade, &topic).await?;
      let reply = lesson_message(&fresh, Vec::new());
      *session = Some(fresh);
      Ok(reply)
    }

    ClientWsMessage::SubmitAnswer { answer } => {
      let s = active(session)?;
      let new_badges = s.submit_answer(tutor, &answer).await?;
      Ok(lesson_message(s, new_badges))
    }

    ClientWsMessage::Reveal => {
      let s = active(session)?;
      s.reveal(tutor).await?;
      Ok(lesson_message(s, Vec::new()))
    }

    ClientWsMessage::NextQuestion => {
      let s = active(session)?;
      s.next_question(tutor).await?;
      Ok(lesson_message(s, Vec::new()))
    }
  }
}

fn active(session: &mut Option<Session>) -> Result<&mut Session, TutorError> {
  session
    .as_mut()
    .ok_or_else(|| TutorError::payload("no active lesson; send `start` first"))
}

fn lesson_message(session: &Session, new_badges: Vec<u32>) -> ServerWsMessage {
  ServerWsMessage::Lesson {
    view: session.view().clone(),
    session: session.snapshot(new_badges),
  }
}

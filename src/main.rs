//! Adaptive Tutor Backend
//!
//! - Axum HTTP + WebSocket API
//! - Lessons, evaluation and hints generated by an OpenAI-compatible model
//! - Static UI fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                    : u16 (default 3000)
//!   OPENAI_API_KEY          : enables the model gateway (required for lessons)
//!   OPENAI_BASE_URL         : default "https://api.openai.com/v1"
//!   OPENAI_MODEL            : generation model, default "gpt-4o"
//!   OPENAI_EVAL_MODEL       : evaluation model, default OPENAI_MODEL
//!   OPENAI_TEMPERATURE      : generation temperature, default 0.7
//!   OPENAI_EVAL_TEMPERATURE : evaluation temperature, default 0.1
//!   OPENAI_TIMEOUT_SECS     : HTTP timeout for model calls, default 60
//!   TUTOR_CONFIG_PATH       : path to TOML config (extra subjects)
//!   LOG_LEVEL               : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT              : "pretty" (default) or "json"

mod config;
mod domain;
mod error;
mod extract;
mod lesson;
mod openai;
mod policy;
mod prompts;
mod protocol;
mod routes;
mod session;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: model gateway, model profile, subject personas.
  let state = Arc::new(AppState::new());

  let app = build_router(state);

  let port = config::env_parse("PORT", 3000u16);
  let addr = SocketAddr::from(([0, 0, 0, 0], port));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "tutor_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "tutor_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "tutor_backend", "Shutdown signal received");
}

//! Application state shared by HTTP and WebSocket handlers.
//!
//! This module owns:
//!   - the model profile (models + temperatures)
//!   - the subject persona table (built-ins + TOML extensions)
//!   - the optional OpenAI gateway
//!
//! Sessions are not stored here: each WebSocket connection owns its own.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_tutor_config_from_env, ModelProfile};
use crate::lesson::Tutor;
use crate::openai::{ModelGateway, OpenAI};
use crate::prompts::PersonaTable;

#[derive(Clone)]
pub struct AppState {
  pub tutor: Tutor,
}

impl AppState {
  /// Build state from env: load config, persona table, model profile, OpenAI client.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_tutor_config_from_env();
    let personas = PersonaTable::from_config(cfg.as_ref());
    let profile = ModelProfile::from_env();

    let gateway: Option<Arc<dyn ModelGateway>> = match OpenAI::from_env() {
      Some(oa) => {
        info!(
          target: "tutor_backend",
          base_url = %oa.base_url,
          model = %profile.model,
          eval_model = %profile.eval_model,
          gen_temperature = profile.gen_temperature,
          eval_temperature = profile.eval_temperature,
          "OpenAI enabled."
        );
        Some(Arc::new(oa))
      }
      None => {
        warn!(target: "tutor_backend", "OpenAI disabled (no OPENAI_API_KEY). Lesson endpoints will report a configuration error.");
        None
      }
    };

    Self::with_tutor(Tutor::new(gateway, profile, personas))
  }

  pub fn with_tutor(tutor: Tutor) -> Self {
    Self { tutor }
  }
}

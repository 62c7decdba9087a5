//! Runtime configuration: model profile from env, subject table extensions from TOML.
//!
//! TOML schema (TUTOR_CONFIG_PATH):
//!
//! ```toml
//! [[subjects]]
//! id = "french"
//! kind = "language"
//! label = "French"
//! ```

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::prompts::SubjectKind;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub subjects: Vec<SubjectCfg>,
}

/// Subject entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct SubjectCfg {
  pub id: String,
  pub kind: SubjectKind,
  #[serde(default)]
  pub label: Option<String>,
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TutorConfig>(&s) {
      Ok(cfg) => {
        info!(target: "tutor_backend", %path, subjects = cfg.subjects.len(), "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "tutor_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "tutor_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Which model and sampling temperature each kind of call uses.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelProfile {
  pub model: String,
  pub eval_model: String,
  /// Content and question creation.
  pub gen_temperature: f32,
  /// Correctness judging.
  pub eval_temperature: f32,
}

impl Default for ModelProfile {
  fn default() -> Self {
    Self {
      model: "gpt-4o".into(),
      eval_model: "gpt-4o".into(),
      gen_temperature: 0.7,
      eval_temperature: 0.1,
    }
  }
}

impl ModelProfile {
  pub fn from_env() -> Self {
    let defaults = Self::default();
    let model = std::env::var("OPENAI_MODEL").unwrap_or(defaults.model);
    let eval_model = std::env::var("OPENAI_EVAL_MODEL").unwrap_or_else(|_| model.clone());
    Self {
      model,
      eval_model,
      gen_temperature: env_parse("OPENAI_TEMPERATURE", defaults.gen_temperature),
      eval_temperature: env_parse("OPENAI_EVAL_TEMPERATURE", defaults.eval_temperature),
    }
  }
}

/// Parse a numeric env var, warning and falling back to `default` when it is unparseable.
pub fn env_parse<T>(key: &str, default: T) -> T
where
  T: FromStr + Display,
{
  parse_or_default(key, std::env::var(key).ok(), default)
}

fn parse_or_default<T>(key: &str, value: Option<String>, default: T) -> T
where
  T: FromStr + Display,
{
  match value {
    Some(v) => v.trim().parse::<T>().unwrap_or_else(|_| {
      warn!(target: "tutor_backend", key, value = %v, %default, "Unparseable number in env; using default");
      default
    }),
    None => default,
  }
}

//! Loading service configuration from TOML, with `HDU_APP_*` environment overrides.
//!
//! The file path comes from `APP_CONFIG_PATH` (default `config/config.toml`).
//! A missing file is not an error: defaults plus environment are used instead.
//! Override names are the dotted key upper-cased with `.` → `_`, e.g.
//! `ai_service.api_key` → `HDU_APP_AI_SERVICE_API_KEY`.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
const ENV_PREFIX: &str = "HDU_APP_";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read { path: String, source: std::io::Error },
  #[error("failed to parse config file {path}: {source}")]
  Parse { path: String, source: toml::de::Error },
  #[error("environment variable {var} has invalid value '{value}'")]
  BadEnv { var: String, value: String },
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
  pub server: ServerConfig,
  pub database: DatabaseConfig,
  pub hdu_api: HduApiConfig,
  pub ai_service: AiServiceConfig,
  pub sso: SsoConfig,
  pub exam: ExamConfig,
  pub cors: CorsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub port: u16,
}

impl Default for ServerConfig {
  fn default() -> Self { Self { port: 8080 } }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  /// Word list with `wordToDefinition` / `meaningToWord` maps.
  pub json_path: String,
  /// Learned fingerprint → letter cache.
  pub answer_bank_path: String,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      json_path: "data/words.json".into(),
      answer_bank_path: "data/answer_bank.json".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HduApiConfig {
  pub base_url: String,
  pub timeout_seconds: u64,
}

impl Default for HduApiConfig {
  fn default() -> Self {
    Self { base_url: "https://skl.hdu.edu.cn/api".into(), timeout_seconds: 30 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AiServiceConfig {
  pub base_url: String,
  pub api_key: String,
  pub model: String,
  pub timeout_seconds: u64,
}

impl Default for AiServiceConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.openai.com/v1".into(),
      api_key: String::new(),
      model: "gpt-4o-mini".into(),
      timeout_seconds: 60,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SsoConfig {
  pub login_url: String,
  /// CAS service callback; the generated state token is appended to it.
  pub service_url: String,
  /// Origin whose cookie jar is checked for `X-Auth-Token` when no redirect carries it.
  pub quiz_origin: String,
  pub timeout_seconds: u64,
  pub max_redirects: usize,
}

impl Default for SsoConfig {
  fn default() -> Self {
    Self {
      login_url: "https://sso.hdu.edu.cn/login".into(),
      service_url: "https://skl.hdu.edu.cn/api/cas/login".into(),
      quiz_origin: "https://skl.hdu.edu.cn".into(),
      timeout_seconds: 60,
      max_redirects: 10,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExamConfig {
  /// Wait before fetching the graded paper, so grading has settled.
  pub learning_delay_seconds: u64,
  /// Added on top of the remaining submission delay.
  pub submit_buffer_millis: u64,
}

impl Default for ExamConfig {
  fn default() -> Self {
    Self { learning_delay_seconds: 5, submit_buffer_millis: 300 }
  }
}

impl ExamConfig {
  pub fn learning_delay(&self) -> Duration { Duration::from_secs(self.learning_delay_seconds) }
  pub fn submit_buffer(&self) -> Duration { Duration::from_millis(self.submit_buffer_millis) }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct CorsConfig {
  /// Empty means any origin.
  pub allowed_origins: Vec<String>,
}

impl AppConfig {
  /// Load from `APP_CONFIG_PATH` (or the default path), then apply environment overrides.
  pub fn load() -> Result<Self, ConfigError> {
    let path = std::env::var("APP_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut cfg = match std::fs::read_to_string(&path) {
      Ok(s) => {
        let cfg = Self::from_toml_str(&s).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        info!(target: "autoword_backend", %path, "Loaded config (TOML)");
        cfg
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!(target: "autoword_backend", %path, "Config file not found; relying on defaults and environment");
        Self::default()
      }
      Err(source) => return Err(ConfigError::Read { path, source }),
    };
    cfg.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(cfg)
  }

  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(s)
  }

  /// Apply `HDU_APP_*` overrides using `lookup` to read variables.
  pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

    set_string(&mut self.database.json_path, get("DATABASE_JSON_PATH"));
    set_string(&mut self.database.answer_bank_path, get("DATABASE_ANSWER_BANK_PATH"));
    set_string(&mut self.hdu_api.base_url, get("HDU_API_BASE_URL"));
    set_string(&mut self.ai_service.base_url, get("AI_SERVICE_BASE_URL"));
    set_string(&mut self.ai_service.api_key, get("AI_SERVICE_API_KEY"));
    set_string(&mut self.ai_service.model, get("AI_SERVICE_MODEL"));
    set_string(&mut self.sso.login_url, get("SSO_LOGIN_URL"));
    set_string(&mut self.sso.service_url, get("SSO_SERVICE_URL"));
    set_string(&mut self.sso.quiz_origin, get("SSO_QUIZ_ORIGIN"));

    set_parsed(&mut self.server.port, "SERVER_PORT", get("SERVER_PORT"))?;
    set_parsed(&mut self.hdu_api.timeout_seconds, "HDU_API_TIMEOUT_SECONDS", get("HDU_API_TIMEOUT_SECONDS"))?;
    set_parsed(&mut self.ai_service.timeout_seconds, "AI_SERVICE_TIMEOUT_SECONDS", get("AI_SERVICE_TIMEOUT_SECONDS"))?;
    set_parsed(&mut self.sso.timeout_seconds, "SSO_TIMEOUT_SECONDS", get("SSO_TIMEOUT_SECONDS"))?;
    set_parsed(&mut self.sso.max_redirects, "SSO_MAX_REDIRECTS", get("SSO_MAX_REDIRECTS"))?;
    set_parsed(&mut self.exam.learning_delay_seconds, "EXAM_LEARNING_DELAY_SECONDS", get("EXAM_LEARNING_DELAY_SECONDS"))?;
    set_parsed(&mut self.exam.submit_buffer_millis, "EXAM_SUBMIT_BUFFER_MILLIS", get("EXAM_SUBMIT_BUFFER_MILLIS"))?;

    if let Some(origins) = get("CORS_ALLOWED_ORIGINS") {
      self.cors.allowed_origins = origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    }
    Ok(())
  }
}

fn set_string(slot: &mut String, value: Option<String>) {
  if let Some(v) = value {
    *slot = v;
  }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, value: Option<String>) -> Result<(), ConfigError> {
  if let Some(v) = value {
    *slot = v.trim().parse().map_err(|_| ConfigError::BadEnv { var: format!("{ENV_PREFIX}{key}"), value: v.clone() })?;
  }
  Ok(())
}

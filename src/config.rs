//! Service configuration: optional TOML file overlaid by environment variables.
//!
//! Env variables win over the file. See `AppConfig` for the schema; every
//! field has a default so an empty (or missing) file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_REMOTE_URL: &str = "https://emkc.org/api/v2/piston";

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
  /// Spawn a local interpreter per execution.
  #[default]
  Local,
  /// Piston-compatible remote execution API.
  Remote,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  pub kind: RuntimeKind,
  pub python: String,
  pub remote_url: String,
  pub timeout_ms: u64,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      kind: RuntimeKind::Local,
      python: "python3".into(),
      remote_url: DEFAULT_REMOTE_URL.into(),
      timeout_ms: DEFAULT_TIMEOUT_MS,
    }
  }
}

impl RuntimeConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub port: u16,
  /// JSON snapshot backing the document store. `None` keeps everything in memory.
  pub data_path: Option<PathBuf>,
  /// Questions file loaded when the store starts without questions.
  pub questions_path: Option<PathBuf>,
  pub admin_emails: Vec<String>,
  pub runtime: RuntimeConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      data_path: None,
      questions_path: None,
      admin_emails: Vec::new(),
      runtime: RuntimeConfig::default(),
    }
  }
}

impl AppConfig {
  /// File at QUIZIFY_CONFIG_PATH (if any), then env overrides.
  pub fn load() -> Self {
    let mut cfg = load_config_file_from_env().unwrap_or_default();
    cfg.apply_env(|k| std::env::var(k).ok());
    cfg
  }

  /// Apply overrides from a key lookup. Unparseable values are logged and ignored.
  pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
    if let Some(p) = get("PORT") {
      match p.parse::<u16>() {
        Ok(port) => self.port = port,
        Err(e) => error!(target: "quizify_backend", value = %p, error = %e, "Ignoring invalid PORT"),
      }
    }
    if let Some(p) = get("QUIZIFY_DATA_PATH").filter(|s| !s.is_empty()) {
      self.data_path = Some(PathBuf::from(p));
    }
    if let Some(p) = get("QUIZIFY_QUESTIONS_PATH").filter(|s| !s.is_empty()) {
      self.questions_path = Some(PathBuf::from(p));
    }
    if let Some(list) = get("QUIZIFY_ADMIN_EMAILS") {
      self.admin_emails = list
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    }
    if let Some(kind) = get("QUIZIFY_RUNTIME") {
      match kind.as_str() {
        "local" => self.runtime.kind = RuntimeKind::Local,
        "remote" => self.runtime.kind = RuntimeKind::Remote,
        other => error!(target: "quizify_backend", value = %other, "Ignoring unknown QUIZIFY_RUNTIME"),
      }
    }
    if let Some(py) = get("QUIZIFY_PYTHON").filter(|s| !s.is_empty()) {
      self.runtime.python = py;
    }
    if let Some(url) = get("QUIZIFY_RUNTIME_URL").filter(|s| !s.is_empty()) {
      self.runtime.remote_url = url.trim_end_matches('/').to_string();
    }
    if let Some(t) = get("QUIZIFY_TIMEOUT_MS") {
      match t.parse::<u64>() {
        Ok(ms) if ms > 0 => self.runtime.timeout_ms = ms,
        _ => error!(target: "quizify_backend", value = %t, "Ignoring invalid QUIZIFY_TIMEOUT_MS"),
      }
    }
  }

  pub fn is_admin(&self, email: &str) -> bool {
    let email = email.trim().to_lowercase();
    !email.is_empty() && self.admin_emails.iter().any(|a| a.trim().eq_ignore_ascii_case(&email))
  }
}

/// Attempt to load `AppConfig` from QUIZIFY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("QUIZIFY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizify_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizify_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizify_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

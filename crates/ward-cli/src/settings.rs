//! Layered configuration: optional file, then `WARD_*` environment
//! variables, then command-line flags.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;
use uuid::Uuid;
use ward_client::ServerConfig;
use ward_sync::{ClinicalConcepts, Timeouts};

#[derive(Debug, Clone, Deserialize)]
pub struct WardConfig {
  pub server:               ServerConfig,
  pub store_path:           PathBuf,
  pub locale:               String,
  pub default_locale:       String,
  /// Charts fetched by a full sync; the first is the one displayed.
  #[serde(default)]
  pub chart_uuids:          Vec<Uuid>,
  /// The signed-in clinician, looked up in the cached users table.
  #[serde(default)]
  pub user_uuid:            Option<Uuid>,
  pub workers:              usize,
  pub request_timeout_secs: u64,
  pub commit_timeout_secs:  u64,
  #[serde(default)]
  pub concepts:             ClinicalConcepts,
}

/// Flag values that take precedence over every other source.
#[derive(Debug, Default)]
pub struct Overrides {
  pub url:      Option<String>,
  pub user:     Option<String>,
  pub password: Option<String>,
  pub locale:   Option<String>,
}

impl WardConfig {
  pub fn load(path: &Path, overrides: Overrides) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("server.base_url", "http://localhost:8080")?
      .set_default("store_path", "~/.local/share/ward/ward.db")?
      .set_default("locale", "en")?
      .set_default("default_locale", "en")?
      .set_default("workers", 2)?
      .set_default("request_timeout_secs", 30)?
      .set_default("commit_timeout_secs", 30)?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("WARD").separator("__"))
      .set_override_option("server.base_url", overrides.url)?
      .set_override_option("server.username", overrides.user)?
      .set_override_option("server.password", overrides.password)?
      .set_override_option("locale", overrides.locale)?
      .build()
      .context("failed to read configuration")?;

    let mut cfg: WardConfig = settings
      .try_deserialize()
      .context("failed to deserialise WardConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    cfg.workers = cfg.workers.max(1);
    Ok(cfg)
  }

  pub fn timeouts(&self) -> Timeouts {
    Timeouts {
      request: Duration::from_secs(self.request_timeout_secs),
      commit:  Duration::from_secs(self.commit_timeout_secs),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

//! The explicit per-process context handed to every component.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use ward_core::{concept::ConceptUuid, patient::User};

/// Deadlines for the engine's two suspension points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
  /// Per network call.
  pub request: Duration,
  /// Per local-store commit.
  pub commit:  Duration,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      request: Duration::from_secs(30),
      commit:  Duration::from_secs(30),
    }
  }
}

/// Concepts the engine interprets itself when prepopulating an encounter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalConcepts {
  #[serde(default)]
  pub pregnancy: Option<ConceptUuid>,
  #[serde(default)]
  pub iv_fitted: Option<ConceptUuid>,
  /// The coded answer meaning "yes".
  #[serde(default)]
  pub yes:       Option<ConceptUuid>,
}

/// Who is using the client, against which server, in which language.
#[derive(Debug, Clone)]
pub struct SessionContext {
  pub server_url:     String,
  /// The clinician recorded on new encounters, once known.
  pub user:           Option<User>,
  pub locale:         String,
  pub default_locale: String,
  /// Charts fetched by a full sync; the first is the one assembled.
  pub chart_uuids:    Vec<Uuid>,
  pub concepts:       ClinicalConcepts,
  pub timeouts:       Timeouts,
}

impl SessionContext {
  pub fn new(server_url: impl Into<String>) -> Self {
    Self {
      server_url:     server_url.into(),
      user:           None,
      locale:         "en".into(),
      default_locale: "en".into(),
      chart_uuids:    Vec::new(),
      concepts:       ClinicalConcepts::default(),
      timeouts:       Timeouts::default(),
    }
  }

  pub fn primary_chart(&self) -> Option<Uuid> { self.chart_uuids.first().copied() }
}

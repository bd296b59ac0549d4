//! Error type for `ward-sync` and the failure taxonomy carried by
//! notifications.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;
use uuid::Uuid;
use ward_core::remote::RemoteError;

#[derive(Debug, Error)]
pub enum Error {
  /// Another sync is already running; nothing was touched.
  #[error("a sync is already in progress")]
  Busy,

  #[error("remote call failed: {0}")]
  Remote(#[from] RemoteError),

  #[error("local store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("local store commit timed out")]
  CommitTimeout,

  #[error("operation cancelled")]
  Cancelled,

  #[error("patient {0} is not cached")]
  PatientNotFound(Uuid),

  #[error("concept {0:?} is not cached")]
  ConceptNotFound(String),

  #[error("location {location} names unknown parent {parent}")]
  UnknownParentLocation { location: Uuid, parent: Uuid },

  #[error("location {0} appears more than once")]
  DuplicateLocation(Uuid),

  #[error("location {0} is part of a cycle")]
  LocationCycle(Uuid),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub(crate) fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// The notification-level classification of this error.
  pub fn kind(&self) -> FailureKind {
    match self {
      Self::Remote(RemoteError::Transport(_) | RemoteError::Timeout) => {
        FailureKind::Transport
      }
      Self::Remote(RemoteError::Server { .. } | RemoteError::Decode(_)) => {
        FailureKind::UnknownServerError
      }
      // The server handed us a location set we refuse to store.
      Self::UnknownParentLocation { .. }
      | Self::DuplicateLocation(_)
      | Self::LocationCycle(_) => FailureKind::UnknownServerError,
      Self::Busy | Self::Cancelled | Self::Join(_) => FailureKind::Interrupted,
      Self::Store(_)
      | Self::CommitTimeout
      | Self::PatientNotFound(_)
      | Self::ConceptNotFound(_) => FailureKind::LocalStore,
    }
  }
}

// ─── Failure taxonomy ────────────────────────────────────────────────────────

/// Why an operation failed, as reported to consumers.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  IntoStaticStr,
)]
pub enum FailureKind {
  /// No response reached us. Cached data is left as-is.
  #[serde(rename = "TRANSPORT_ERROR")]
  #[strum(serialize = "TRANSPORT_ERROR")]
  Transport,

  /// The request reached the server boundary but did not succeed.
  #[serde(rename = "UNKNOWN_SERVER_ERROR")]
  #[strum(serialize = "UNKNOWN_SERVER_ERROR")]
  UnknownServerError,

  /// Cancelled before completion.
  #[serde(rename = "INTERRUPTED")]
  #[strum(serialize = "INTERRUPTED")]
  Interrupted,

  /// The local cache refused or failed to commit the write.
  #[serde(rename = "LOCAL_STORE_ERROR")]
  #[strum(serialize = "LOCAL_STORE_ERROR")]
  LocalStore,
}

impl FailureKind {
  /// Stable string code.
  pub fn code(self) -> &'static str { self.into() }

  /// Whether resubmitting the same request may succeed.
  pub fn is_retryable(self) -> bool {
    matches!(self, Self::Transport | Self::Interrupted)
  }
}

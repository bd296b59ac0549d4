//! Error type for `ward-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ward_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value this build does not know.
  #[error("unrecognised column value: {0}")]
  Decode(String),

  /// An observation referenced a patient or concept that is not cached.
  #[error(
    "observation {observation} references unknown patient {patient} or concept {concept:?}"
  )]
  OrphanObservation {
    observation: uuid::Uuid,
    patient:     uuid::Uuid,
    concept:     String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

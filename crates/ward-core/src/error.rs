//! Error types for `ward-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown concept type: {0:?}")]
  UnknownConceptType(String),

  #[error("unknown section type: {0:?}")]
  UnknownSectionType(String),

  #[error("unknown gender code: {0:?}")]
  UnknownGender(String),

  #[error("timestamp out of range: {0} ms")]
  TimestampOutOfRange(i64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

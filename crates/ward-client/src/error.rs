//! Error type for building a `ward-client` connection.
//!
//! Request-level failures are reported as [`ward_core::remote::RemoteError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Build(#[from] reqwest::Error),

  #[error("invalid server base URL: {0:?}")]
  InvalidBaseUrl(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

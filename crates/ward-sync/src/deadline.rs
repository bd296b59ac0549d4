//! Per-call deadlines for the two suspension points: the network call and
//! the local commit. Expiry fails the operation; nothing is retried.

use std::{future::Future, time::Duration};

use tokio::time::timeout;
use ward_core::remote::RemoteError;

use crate::{Error, Result};

pub(crate) async fn remote<T>(
  limit: Duration,
  call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T> {
  match timeout(limit, call).await {
    Ok(result) => Ok(result?),
    Err(_) => Err(Error::Remote(RemoteError::Timeout)),
  }
}

pub(crate) async fn local<T, E>(
  limit: Duration,
  call: impl Future<Output = Result<T, E>>,
) -> Result<T>
where
  E: std::error::Error + Send + Sync + 'static,
{
  match timeout(limit, call).await {
    Ok(result) => result.map_err(Error::store),
    Err(_) => Err(Error::CommitTimeout),
  }
}

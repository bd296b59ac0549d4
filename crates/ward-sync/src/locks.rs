//! Per-table-group writer locks.
//!
//! Writers to the same group serialise; the two groups proceed concurrently.
//! Readers never take these locks.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct WriterLocks {
  reference:    Arc<Mutex<()>>,
  observations: Arc<Mutex<()>>,
}

impl WriterLocks {
  /// Locations, concepts, charts, patients, orders and users.
  pub async fn reference(&self) -> MutexGuard<'_, ()> {
    self.reference.lock().await
  }

  /// The observations table.
  pub async fn observations(&self) -> MutexGuard<'_, ()> {
    self.observations.lock().await
  }
}

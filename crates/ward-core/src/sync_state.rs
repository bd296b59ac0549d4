//! The singleton sync-state record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress markers for full and incremental synchronisation.
///
/// All three fields start out `None` on a fresh store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
  /// Client clock; written before a full sync touches any data.
  pub full_sync_start_time: Option<DateTime<Utc>>,
  /// Client clock; written only after a full sync completes without error.
  pub full_sync_end_time:   Option<DateTime<Utc>>,
  /// Server clock; the snapshot time of the last committed observation sync.
  pub obs_sync_time:        Option<DateTime<Utc>>,
}

impl SyncState {
  /// A full sync started but never finished (crash, cancellation, failure).
  pub fn full_sync_interrupted(&self) -> bool {
    match (self.full_sync_start_time, self.full_sync_end_time) {
      (Some(_), None) => true,
      (Some(start), Some(end)) => end < start,
      (None, _) => false,
    }
  }

  /// At least one full sync has completed.
  pub fn has_full_sync(&self) -> bool { self.full_sync_end_time.is_some() }
}

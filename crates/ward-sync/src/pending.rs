//! Correlates outstanding capture requests with the patient they were
//! launched for.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque correlation id handed to the capture collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl std::fmt::Display for RequestId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

#[derive(Debug, Default)]
pub struct PendingRequests {
  by_id: HashMap<RequestId, Uuid>,
}

impl PendingRequests {
  pub fn new() -> Self { Self::default() }

  /// Register a request for `patient_uuid`. Ids are never reused.
  pub fn insert(&mut self, patient_uuid: Uuid) -> RequestId {
    let id = RequestId(Uuid::new_v4());
    self.by_id.insert(id, patient_uuid);
    id
  }

  pub fn get(&self, id: RequestId) -> Option<Uuid> { self.by_id.get(&id).copied() }

  /// Resolve and forget a request.
  pub fn take(&mut self, id: RequestId) -> Option<Uuid> { self.by_id.remove(&id) }

  pub fn len(&self) -> usize { self.by_id.len() }

  pub fn is_empty(&self) -> bool { self.by_id.is_empty() }
}

//! Locations: the site's ward/tent hierarchy.
//!
//! Locations form a tree through `parent_uuid`; the root has no parent. Names
//! are stored separately, one row per locale.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in the location tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub uuid:        Uuid,
  /// `None` only for the root.
  pub parent_uuid: Option<Uuid>,
}

/// The display name of a location in one locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationName {
  pub location_uuid: Uuid,
  pub locale:        String,
  pub name:          String,
}

/// A location with its name resolved for a locale and the number of patients
/// assigned directly to it (child locations are not included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedLocation {
  pub uuid:          Uuid,
  pub parent_uuid:   Option<Uuid>,
  pub name:          String,
  pub patient_count: u32,
}

//! Concepts: the dictionary of things that can be observed.
//!
//! Concept identifiers come from the server's concept dictionary and are not
//! RFC 4122 UUIDs, so they are carried as opaque strings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a concept in the server's dictionary.
pub type ConceptUuid = String;

/// The data type of a concept's values; drives rendering and validation in
/// the capture layer.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConceptType {
  Numeric,
  Text,
  Coded,
  Boolean,
  Date,
  Datetime,
  /// Question/answer-only concepts; the server calls this type `N/A`.
  #[serde(alias = "N/A")]
  #[strum(to_string = "NONE", serialize = "N/A")]
  None,
}

/// A dictionary concept. Immutable once synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
  pub uuid:         ConceptUuid,
  /// Identifier of the concept in the form-capture system.
  pub xform_id:     i64,
  pub concept_type: ConceptType,
}

/// The display name of a concept in one locale. Unique per
/// `(concept_uuid, locale)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptName {
  pub concept_uuid: ConceptUuid,
  pub locale:       String,
  pub name:         String,
}

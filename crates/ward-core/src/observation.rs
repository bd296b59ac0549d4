//! Observations: time-series clinical facts.
//!
//! Rows loaded from the server are *confirmed*. Rows written locally after an
//! encounter submission carry `temp_cache = true` until a confirmed copy for
//! the same `(patient, concept, encounter time)` arrives and supersedes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, concept::ConceptUuid};

/// A stored observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
  /// Local row id; breaks ties between equal encounter times.
  pub id:             i64,
  pub uuid:           Uuid,
  pub patient_uuid:   Uuid,
  pub encounter_uuid: Uuid,
  pub encounter_time: DateTime<Utc>,
  pub concept_uuid:   ConceptUuid,
  /// Raw value; for coded concepts this is the answer concept's uuid.
  pub value:          String,
  pub temp_cache:     bool,
}

impl Observation {
  pub fn is_confirmed(&self) -> bool { !self.temp_cache }

  pub fn key(&self) -> ObservationKey {
    ObservationKey {
      patient_uuid:     self.patient_uuid,
      concept_uuid:     self.concept_uuid.clone(),
      encounter_millis: self.encounter_time.timestamp_millis(),
    }
  }
}

/// Identity used to match a cached observation with its confirmed copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
  pub patient_uuid:     Uuid,
  pub concept_uuid:     ConceptUuid,
  pub encounter_millis: i64,
}

/// An observation to be written; the row id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewObservation {
  pub uuid:           Uuid,
  pub patient_uuid:   Uuid,
  pub encounter_uuid: Uuid,
  pub encounter_time: DateTime<Utc>,
  pub concept_uuid:   ConceptUuid,
  pub value:          String,
}

impl NewObservation {
  pub fn key(&self) -> ObservationKey {
    ObservationKey {
      patient_uuid:     self.patient_uuid,
      concept_uuid:     self.concept_uuid.clone(),
      encounter_millis: self.encounter_time.timestamp_millis(),
    }
  }
}

/// Convert a stored `encounter_millis` column back into a timestamp.
pub fn time_from_millis(millis: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(millis)
    .ok_or(Error::TimestampOutOfRange(millis))
}

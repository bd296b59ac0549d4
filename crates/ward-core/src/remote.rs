//! The `ChartServer` trait, the seam between the sync engine and the
//! clinical records server, plus the payload types it exchanges.
//!
//! Implementations attach credentials and deserialise responses; they hold no
//! cache and make no merge decisions. Every call resolves to a value or a
//! [`RemoteError`]; nothing is thrown synchronously.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  chart::ChartStructure,
  concept::{Concept, ConceptName, ConceptType, ConceptUuid},
  location::{Location, LocationName},
  observation::NewObservation,
  patient::{Order, Patient, User},
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Why a remote call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  /// No response reached us (connection refused, DNS, reset, ...).
  #[error("transport failure: {0}")]
  Transport(String),

  /// The server answered with a non-success status.
  #[error("server returned {status}: {message}")]
  Server { status: u16, message: String },

  /// The response arrived but its body could not be understood.
  #[error("could not decode server response: {0}")]
  Decode(String),

  /// The call did not complete within its deadline.
  #[error("request timed out")]
  Timeout,
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// A location with its name bundle, as served by `GET /locations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
  pub uuid:        Uuid,
  #[serde(default)]
  pub parent_uuid: Option<Uuid>,
  /// Locale tag → display name.
  #[serde(default)]
  pub names:       BTreeMap<String, String>,
}

impl LocationRecord {
  pub fn location(&self) -> Location {
    Location { uuid: self.uuid, parent_uuid: self.parent_uuid }
  }

  pub fn localized_names(&self) -> impl Iterator<Item = LocationName> + '_ {
    self.names.iter().map(|(locale, name)| LocationName {
      location_uuid: self.uuid,
      locale:        locale.clone(),
      name:          name.clone(),
    })
  }
}

/// A concept with its name bundle, as served by `GET /concepts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRecord {
  pub uuid:         ConceptUuid,
  pub xform_id:     i64,
  #[serde(rename = "type")]
  pub concept_type: ConceptType,
  #[serde(default)]
  pub names:        BTreeMap<String, String>,
}

impl ConceptRecord {
  pub fn concept(&self) -> Concept {
    Concept {
      uuid:         self.uuid.clone(),
      xform_id:     self.xform_id,
      concept_type: self.concept_type,
    }
  }

  pub fn localized_names(&self) -> impl Iterator<Item = ConceptName> + '_ {
    self.names.iter().map(|(locale, name)| ConceptName {
      concept_uuid: self.uuid.clone(),
      locale:       locale.clone(),
      name:         name.clone(),
    })
  }
}

/// Response of `GET /observations?since=...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationBatch {
  /// Server clock at which the batch was assembled; the next watermark.
  pub snapshot_time: DateTime<Utc>,
  #[serde(default)]
  pub observations:  Vec<NewObservation>,
}

/// A single concept/value pair inside an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterObservation {
  pub uuid:         Uuid,
  pub concept_uuid: ConceptUuid,
  pub value:        String,
}

/// An encounter as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRecord {
  pub uuid:         Uuid,
  pub timestamp:    DateTime<Utc>,
  #[serde(default)]
  pub observations: Vec<EncounterObservation>,
}

impl EncounterRecord {
  /// Flatten into observation rows for `patient_uuid`.
  pub fn into_observations(self, patient_uuid: Uuid) -> Vec<NewObservation> {
    let Self { uuid, timestamp, observations } = self;
    observations
      .into_iter()
      .map(|o| NewObservation {
        uuid: o.uuid,
        patient_uuid,
        encounter_uuid: uuid,
        encounter_time: timestamp,
        concept_uuid: o.concept_uuid,
        value: o.value,
      })
      .collect()
  }
}

/// Response of `GET /patientencounters/{uuid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientChart {
  pub uuid:       Uuid,
  #[serde(default)]
  pub encounters: Vec<EncounterRecord>,
}

impl PatientChart {
  pub fn into_observations(self) -> Vec<NewObservation> {
    let patient_uuid = self.uuid;
    self
      .encounters
      .into_iter()
      .flat_map(|e| e.into_observations(patient_uuid))
      .collect()
  }
}

/// A concept/value pair captured on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationValue {
  pub concept_uuid: ConceptUuid,
  pub value:        String,
}

/// Body of `POST /encounters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEncounter {
  pub patient_uuid: Uuid,
  pub timestamp:    DateTime<Utc>,
  pub observations: Vec<ObservationValue>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the clinical records server's HTTP API.
///
/// All methods return `Send` futures so implementations can be driven from
/// spawned tasks on a multi-threaded runtime.
pub trait ChartServer: Send + Sync {
  /// `GET /locations`
  fn fetch_locations(
    &self,
  ) -> impl Future<Output = Result<Vec<LocationRecord>, RemoteError>> + Send + '_;

  /// `GET /concepts`
  fn fetch_concepts(
    &self,
  ) -> impl Future<Output = Result<Vec<ConceptRecord>, RemoteError>> + Send + '_;

  /// `GET /charts/{chart_uuid}`
  fn fetch_chart_structure(
    &self,
    chart_uuid: Uuid,
  ) -> impl Future<Output = Result<ChartStructure, RemoteError>> + Send + '_;

  /// `GET /patients`
  fn fetch_patients(
    &self,
  ) -> impl Future<Output = Result<Vec<Patient>, RemoteError>> + Send + '_;

  /// `GET /orders`
  fn fetch_orders(
    &self,
  ) -> impl Future<Output = Result<Vec<Order>, RemoteError>> + Send + '_;

  /// `GET /users`
  fn fetch_users(
    &self,
  ) -> impl Future<Output = Result<Vec<User>, RemoteError>> + Send + '_;

  /// `GET /observations?since=...`: observations with an encounter time
  /// strictly after `since` (all observations when `None`).
  fn fetch_observations(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<ObservationBatch, RemoteError>> + Send + '_;

  /// `GET /patientencounters/{patient_uuid}`
  fn fetch_chart(
    &self,
    patient_uuid: Uuid,
  ) -> impl Future<Output = Result<PatientChart, RemoteError>> + Send + '_;

  /// `POST /encounters`
  fn submit_encounter(
    &self,
    encounter: NewEncounter,
  ) -> impl Future<Output = Result<EncounterRecord, RemoteError>> + Send + '_;

  /// `DELETE /observations/{uuid}`. Deleting an already-deleted observation
  /// succeeds.
  fn delete_observation(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<(), RemoteError>> + Send + '_;
}

//! The `ClinicalStore` trait and the bulk-write types it accepts.
//!
//! The trait is implemented by storage backends (e.g. `ward-store-sqlite`).
//! `ward-sync` depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use uuid::Uuid;

use crate::{
  chart::{ChartItem, ChartStructure},
  concept::{Concept, ConceptName},
  location::{LocalizedLocation, Location, LocationName},
  observation::{NewObservation, Observation},
  patient::{Order, Patient, User},
  sync_state::SyncState,
};

// ─── Reference tables ────────────────────────────────────────────────────────

/// The tables replaced wholesale by a full sync, in write order: every table
/// comes after the tables it references.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceTable {
  Locations,
  LocationNames,
  Concepts,
  ConceptNames,
  ChartItems,
  Patients,
  Orders,
  Users,
}

/// A complete set of reference data fetched from the server.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
  pub locations:      Vec<Location>,
  pub location_names: Vec<LocationName>,
  pub concepts:       Vec<Concept>,
  pub concept_names:  Vec<ConceptName>,
  pub charts:         Vec<ChartStructure>,
  pub patients:       Vec<Patient>,
  pub orders:         Vec<Order>,
  pub users:          Vec<User>,
}

impl ReferenceSnapshot {
  /// Number of rows destined for `table`. Chart rows count sections and items.
  pub fn row_count(&self, table: ReferenceTable) -> usize {
    match table {
      ReferenceTable::Locations => self.locations.len(),
      ReferenceTable::LocationNames => self.location_names.len(),
      ReferenceTable::Concepts => self.concepts.len(),
      ReferenceTable::ConceptNames => self.concept_names.len(),
      ReferenceTable::ChartItems => self
        .charts
        .iter()
        .flat_map(|c| &c.sections)
        .map(|s| 1 + s.items.len())
        .sum(),
      ReferenceTable::Patients => self.patients.len(),
      ReferenceTable::Orders => self.orders.len(),
      ReferenceTable::Users => self.users.len(),
    }
  }
}

// ─── Observation write outcomes ──────────────────────────────────────────────

/// What an incremental observation append did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
  /// Confirmed rows written.
  pub inserted:           usize,
  /// Rows skipped because an observation with the same uuid already exists.
  pub duplicates:         usize,
  /// Rows skipped because their patient or concept is not cached.
  pub rejected:           usize,
  /// Locally-cached rows removed in favour of a confirmed copy.
  pub superseded:         usize,
  pub previous_watermark: Option<DateTime<Utc>>,
  /// The watermark after the commit; never earlier than the previous one.
  pub watermark:          Option<DateTime<Utc>>,
}

impl AppendOutcome {
  pub fn watermark_advanced(&self) -> bool {
    self.watermark != self.previous_watermark
  }
}

/// What a single-patient observation refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRefresh {
  /// Confirmed rows dropped before the fresh set was written.
  pub removed:    usize,
  pub inserted:   usize,
  pub rejected:   usize,
  pub superseded: usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the local clinical cache.
///
/// Reference tables are only ever replaced as a group; observations are
/// appended, superseded or deleted row by row. All methods return `Send`
/// futures so the trait can be used from spawned tasks.
pub trait ClinicalStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Sync state ────────────────────────────────────────────────────────

  fn sync_state(
    &self,
  ) -> impl Future<Output = Result<SyncState, Self::Error>> + Send + '_;

  /// Record the start of a full sync before any data is touched.
  fn mark_full_sync_started(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Record the end of a full sync that completed without error.
  fn mark_full_sync_finished(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Bulk writes ───────────────────────────────────────────────────────

  /// Replace every reference table with the contents of `snapshot` in a
  /// single transaction, writing tables in [`ReferenceTable`] order. Either
  /// every table is replaced or none is.
  fn replace_reference_tables(
    &self,
    snapshot: ReferenceSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append confirmed observations and move the watermark forward to
  /// `snapshot_time` (never backward) in one transaction.
  ///
  /// If any row is rejected for an unknown patient or concept, the watermark
  /// stops one millisecond before the earliest rejected encounter time so the
  /// next fetch returns it again.
  fn append_observations(
    &self,
    observations: Vec<NewObservation>,
    snapshot_time: DateTime<Utc>,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + '_;

  /// Replace the confirmed observations of one patient. The watermark is not
  /// touched.
  fn replace_patient_observations(
    &self,
    patient_uuid: Uuid,
    observations: Vec<NewObservation>,
  ) -> impl Future<Output = Result<PatientRefresh, Self::Error>> + Send + '_;

  /// Write locally-cached observations. Fails without writing anything if any
  /// row references an unknown patient or concept.
  ///
  /// A row already stored under its uuid, or already confirmed for the same
  /// patient, concept and encounter time, is not written again; the stored
  /// row is returned in its place.
  fn insert_cached_observations(
    &self,
    observations: Vec<NewObservation>,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + '_;

  /// Delete one observation; returns whether a row was removed.
  fn delete_observation(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_observation(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Option<Observation>, Self::Error>> + Send + '_;

  /// All observations for a patient ordered by encounter time, then row id.
  fn observations_for_patient(
    &self,
    patient_uuid: Uuid,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + '_;

  fn get_patient(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Option<Patient>, Self::Error>> + Send + '_;

  /// List patients, optionally restricted to one location.
  fn list_patients(
    &self,
    location_uuid: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Patient>, Self::Error>> + Send + '_;

  fn concepts(
    &self,
  ) -> impl Future<Output = Result<Vec<Concept>, Self::Error>> + Send + '_;

  fn concept_exists<'a>(
    &'a self,
    uuid: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Every concept name stored for `locale`.
  fn concept_names<'a>(
    &'a self,
    locale: &'a str,
  ) -> impl Future<Output = Result<Vec<ConceptName>, Self::Error>> + Send + 'a;

  /// Rows of one chart ordered by weight, ties in insertion order.
  fn chart_items(
    &self,
    chart_uuid: Uuid,
  ) -> impl Future<Output = Result<Vec<ChartItem>, Self::Error>> + Send + '_;

  /// Every location with its name in `locale`, falling back to
  /// `default_locale` and then to the uuid, plus its direct patient count.
  fn localized_locations<'a>(
    &'a self,
    locale: &'a str,
    default_locale: &'a str,
  ) -> impl Future<Output = Result<Vec<LocalizedLocation>, Self::Error>> + Send + 'a;

  /// Orders for a patient ordered by start time.
  fn orders_for_patient(
    &self,
    patient_uuid: Uuid,
  ) -> impl Future<Output = Result<Vec<Order>, Self::Error>> + Send + '_;

  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + '_;
}

//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, except `observations.encounter_millis`
//! which is milliseconds since the epoch. Dates are `YYYY-MM-DD`. UUIDs are
//! hyphenated lowercase strings. Concept uuid lists are comma-separated.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use ward_core::{
  chart::{ChartItem, ChartStructure, SectionType},
  concept::{Concept, ConceptType},
  location::LocalizedLocation,
  observation::{NewObservation, Observation, time_from_millis},
  patient::{Gender, Order, Patient, User},
  store::ReferenceSnapshot,
  sync_state::SyncState,
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

/// Parse a strum-backed enum column, reporting the offending text on failure.
fn decode_enum<T: FromStr>(column: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("{column}: {s:?}")))
}

pub fn encode_concept_uuids(uuids: &[String]) -> String { uuids.join(",") }

pub fn decode_concept_uuids(s: &str) -> Vec<String> {
  s.split(',')
    .map(str::trim)
    .filter(|u| !u.is_empty())
    .map(str::to_owned)
    .collect()
}

// ─── Observations ────────────────────────────────────────────────────────────

/// Column values for one observation insert.
pub struct ObservationRow {
  pub uuid:             String,
  pub patient_uuid:     String,
  pub encounter_uuid:   String,
  pub encounter_millis: i64,
  pub concept_uuid:     String,
  pub value:            String,
}

impl From<&NewObservation> for ObservationRow {
  fn from(o: &NewObservation) -> Self {
    Self {
      uuid:             encode_uuid(o.uuid),
      patient_uuid:     encode_uuid(o.patient_uuid),
      encounter_uuid:   encode_uuid(o.encounter_uuid),
      encounter_millis: o.encounter_time.timestamp_millis(),
      concept_uuid:     o.concept_uuid.clone(),
      value:            o.value.clone(),
    }
  }
}

/// Raw values read directly from an `observations` row.
pub struct RawObservation {
  pub id:               i64,
  pub uuid:             String,
  pub patient_uuid:     String,
  pub encounter_uuid:   String,
  pub encounter_millis: i64,
  pub concept_uuid:     String,
  pub value:            String,
  pub temp_cache:       bool,
}

/// Column list matching [`RawObservation::from_row`].
pub const OBSERVATION_COLUMNS: &str = "id, uuid, patient_uuid, encounter_uuid, \
                                       encounter_millis, concept_uuid, value, \
                                       temp_cache";

impl RawObservation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      uuid:             row.get(1)?,
      patient_uuid:     row.get(2)?,
      encounter_uuid:   row.get(3)?,
      encounter_millis: row.get(4)?,
      concept_uuid:     row.get(5)?,
      value:            row.get(6)?,
      temp_cache:       row.get(7)?,
    })
  }

  pub fn into_observation(self) -> Result<Observation> {
    Ok(Observation {
      id:             self.id,
      uuid:           decode_uuid(&self.uuid)?,
      patient_uuid:   decode_uuid(&self.patient_uuid)?,
      encounter_uuid: decode_uuid(&self.encounter_uuid)?,
      encounter_time: time_from_millis(self.encounter_millis)?,
      concept_uuid:   self.concept_uuid,
      value:          self.value,
      temp_cache:     self.temp_cache,
    })
  }
}

// ─── Patients ────────────────────────────────────────────────────────────────

pub struct RawPatient {
  pub uuid:          String,
  pub given_name:    String,
  pub family_name:   String,
  pub location_uuid: Option<String>,
  pub birthdate:     Option<String>,
  pub gender:        Option<String>,
}

pub const PATIENT_COLUMNS: &str =
  "uuid, given_name, family_name, location_uuid, birthdate, gender";

impl RawPatient {
  pub fn from_patient(p: &Patient) -> Self {
    Self {
      uuid:          encode_uuid(p.uuid),
      given_name:    p.given_name.clone(),
      family_name:   p.family_name.clone(),
      location_uuid: p.location_uuid.map(encode_uuid),
      birthdate:     p.birthdate.map(encode_date),
      gender:        p.gender.map(|g| g.to_string()),
    }
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:          row.get(0)?,
      given_name:    row.get(1)?,
      family_name:   row.get(2)?,
      location_uuid: row.get(3)?,
      birthdate:     row.get(4)?,
      gender:        row.get(5)?,
    })
  }

  pub fn into_patient(self) -> Result<Patient> {
    Ok(Patient {
      uuid:          decode_uuid(&self.uuid)?,
      given_name:    self.given_name,
      family_name:   self.family_name,
      location_uuid: decode_opt_uuid(self.location_uuid)?,
      birthdate:     self.birthdate.as_deref().map(decode_date).transpose()?,
      gender:        self
        .gender
        .as_deref()
        .map(|g| decode_enum::<Gender>("gender", g))
        .transpose()?,
    })
  }
}

// ─── Orders ──────────────────────────────────────────────────────────────────

pub struct RawOrder {
  pub uuid:         String,
  pub patient_uuid: String,
  pub instructions: String,
  pub start_time:   String,
  pub stop_time:    Option<String>,
}

impl RawOrder {
  pub fn from_order(o: &Order) -> Self {
    Self {
      uuid:         encode_uuid(o.uuid),
      patient_uuid: encode_uuid(o.patient_uuid),
      instructions: o.instructions.clone(),
      start_time:   encode_dt(o.start_time),
      stop_time:    o.stop_time.map(encode_dt),
    }
  }

  pub fn into_order(self) -> Result<Order> {
    Ok(Order {
      uuid:         decode_uuid(&self.uuid)?,
      patient_uuid: decode_uuid(&self.patient_uuid)?,
      instructions: self.instructions,
      start_time:   decode_dt(&self.start_time)?,
      stop_time:    decode_opt_dt(self.stop_time)?,
    })
  }
}

// ─── Concepts ────────────────────────────────────────────────────────────────

pub struct RawConcept {
  pub uuid:         String,
  pub xform_id:     i64,
  pub concept_type: String,
}

impl RawConcept {
  pub fn into_concept(self) -> Result<Concept> {
    Ok(Concept {
      uuid:         self.uuid,
      xform_id:     self.xform_id,
      concept_type: decode_enum::<ConceptType>("concept_type", &self.concept_type)?,
    })
  }
}

// ─── Chart items ─────────────────────────────────────────────────────────────

pub struct RawChartItem {
  pub id:             i64,
  pub chart_uuid:     String,
  pub weight:         i64,
  pub section_type:   Option<String>,
  pub parent_id:      Option<i64>,
  pub label:          String,
  pub item_type:      Option<String>,
  pub required:       bool,
  pub concept_uuids:  String,
  pub format:         Option<String>,
  pub caption_format: Option<String>,
}

impl RawChartItem {
  pub fn into_chart_item(self) -> Result<ChartItem> {
    Ok(ChartItem {
      id:             self.id,
      chart_uuid:     decode_uuid(&self.chart_uuid)?,
      weight:         self.weight,
      section_type:   self
        .section_type
        .as_deref()
        .map(|s| decode_enum::<SectionType>("section_type", s))
        .transpose()?,
      parent_id:      self.parent_id,
      label:          self.label,
      item_type:      self.item_type,
      required:       self.required,
      concept_uuids:  decode_concept_uuids(&self.concept_uuids),
      format:         self.format,
      caption_format: self.caption_format,
    })
  }
}

/// A chart section with its items, encoded for insertion. Item `parent_id`s
/// are filled in from the section's row id at insert time.
pub struct EncodedSection {
  pub weight:       i64,
  pub section_type: String,
  pub label:        String,
  pub items:        Vec<EncodedItem>,
}

pub struct EncodedItem {
  pub weight:         i64,
  pub label:          String,
  pub item_type:      Option<String>,
  pub required:       bool,
  pub concept_uuids:  String,
  pub format:         Option<String>,
  pub caption_format: Option<String>,
}

/// Flatten a chart definition; missing weights default to position.
pub fn encode_chart(chart: &ChartStructure) -> (String, Vec<EncodedSection>) {
  let sections = chart
    .sections
    .iter()
    .enumerate()
    .map(|(pos, s)| EncodedSection {
      weight:       s.weight.unwrap_or(pos as i64),
      section_type: s.section_type.to_string(),
      label:        s.label.clone(),
      items:        s
        .items
        .iter()
        .enumerate()
        .map(|(item_pos, i)| EncodedItem {
          weight:         i.weight.unwrap_or(item_pos as i64),
          label:          i.label.clone(),
          item_type:      i.item_type.clone(),
          required:       i.required,
          concept_uuids:  encode_concept_uuids(&i.concept_uuids),
          format:         i.format.clone(),
          caption_format: i.caption_format.clone(),
        })
        .collect(),
    })
    .collect();
  (encode_uuid(chart.uuid), sections)
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Every reference table encoded to column strings, ready to be moved onto
/// the database thread.
pub struct EncodedSnapshot {
  pub locations:      Vec<(String, Option<String>)>,
  pub location_names: Vec<(String, String, String)>,
  pub concepts:       Vec<(String, i64, String)>,
  pub concept_names:  Vec<(String, String, String)>,
  pub charts:         Vec<(String, Vec<EncodedSection>)>,
  pub patients:       Vec<RawPatient>,
  pub orders:         Vec<RawOrder>,
  pub users:          Vec<(String, String)>,
}

impl From<&ReferenceSnapshot> for EncodedSnapshot {
  fn from(s: &ReferenceSnapshot) -> Self {
    Self {
      locations:      s
        .locations
        .iter()
        .map(|l| (encode_uuid(l.uuid), l.parent_uuid.map(encode_uuid)))
        .collect(),
      location_names: s
        .location_names
        .iter()
        .map(|n| (encode_uuid(n.location_uuid), n.locale.clone(), n.name.clone()))
        .collect(),
      concepts:       s
        .concepts
        .iter()
        .map(|c| (c.uuid.clone(), c.xform_id, c.concept_type.to_string()))
        .collect(),
      concept_names:  s
        .concept_names
        .iter()
        .map(|n| (n.concept_uuid.clone(), n.locale.clone(), n.name.clone()))
        .collect(),
      charts:         s.charts.iter().map(encode_chart).collect(),
      patients:       s.patients.iter().map(RawPatient::from_patient).collect(),
      orders:         s.orders.iter().map(RawOrder::from_order).collect(),
      users:          s
        .users
        .iter()
        .map(|u| (encode_uuid(u.uuid), u.full_name.clone()))
        .collect(),
    }
  }
}

// ─── Sync state, users, locations ────────────────────────────────────────────

pub struct RawSyncState {
  pub full_sync_start_time: Option<String>,
  pub full_sync_end_time:   Option<String>,
  pub obs_sync_time:        Option<String>,
}

impl RawSyncState {
  pub fn into_sync_state(self) -> Result<SyncState> {
    Ok(SyncState {
      full_sync_start_time: decode_opt_dt(self.full_sync_start_time)?,
      full_sync_end_time:   decode_opt_dt(self.full_sync_end_time)?,
      obs_sync_time:        decode_opt_dt(self.obs_sync_time)?,
    })
  }
}

pub fn decode_user(uuid: &str, full_name: String) -> Result<User> {
  Ok(User { uuid: decode_uuid(uuid)?, full_name })
}

pub struct RawLocalizedLocation {
  pub uuid:          String,
  pub parent_uuid:   Option<String>,
  pub name:          String,
  pub patient_count: u32,
}

impl RawLocalizedLocation {
  pub fn into_localized(self) -> Result<LocalizedLocation> {
    Ok(LocalizedLocation {
      uuid:          decode_uuid(&self.uuid)?,
      parent_uuid:   decode_opt_uuid(self.parent_uuid)?,
      name:          self.name,
      patient_count: self.patient_count,
    })
  }
}

//! Patients, orders and users: the per-site people records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Administrative gender as recorded by the server.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum Gender {
  #[serde(rename = "M")]
  #[strum(serialize = "M")]
  Male,
  #[serde(rename = "F")]
  #[strum(serialize = "F")]
  Female,
}

/// A cached patient record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
  pub uuid:          Uuid,
  pub given_name:    String,
  pub family_name:   String,
  /// `None` while the patient is not assigned to any location.
  pub location_uuid: Option<Uuid>,
  pub birthdate:     Option<NaiveDate>,
  pub gender:        Option<Gender>,
}

impl Patient {
  /// `"Given Family"`, skipping empty parts.
  pub fn display_name(&self) -> String {
    [self.given_name.as_str(), self.family_name.as_str()]
      .into_iter()
      .filter(|s| !s.is_empty())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// A treatment order. Independent of observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub uuid:         Uuid,
  pub patient_uuid: Uuid,
  pub instructions: String,
  pub start_time:   DateTime<Utc>,
  pub stop_time:    Option<DateTime<Utc>>,
}

impl Order {
  /// Whether the order is in effect at `at`.
  pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
    self.start_time <= at && self.stop_time.is_none_or(|stop| at < stop)
  }
}

/// An authorised user of the client (read-only cache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub uuid:      Uuid,
  pub full_name: String,
}

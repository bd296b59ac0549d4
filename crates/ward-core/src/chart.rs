//! Chart structure: how a patient's observations are grouped for display.
//!
//! All charts share one flat `chart_items` table. Sections are rows with a
//! `section_type` and no `parent_id`; items carry the row id of their section
//! in `parent_id`. A chart is read by filtering on `chart_uuid` and ordering
//! by `(weight, id)`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::concept::ConceptUuid;

/// How a section is laid out.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionType {
  TileRow,
  GridSection,
}

/// One stored row of a chart: either a section or an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartItem {
  /// Local row id; reflects insertion order.
  pub id:             i64,
  pub chart_uuid:     Uuid,
  /// Sort key within the chart.
  pub weight:         i64,
  /// Set for sections only.
  pub section_type:   Option<SectionType>,
  /// Row id of the owning section; `None` for sections.
  pub parent_id:      Option<i64>,
  pub label:          String,
  /// Rendering type; items only.
  pub item_type:      Option<String>,
  /// `true` to show the row even when no observations exist.
  pub required:       bool,
  pub concept_uuids:  Vec<ConceptUuid>,
  pub format:         Option<String>,
  pub caption_format: Option<String>,
}

impl ChartItem {
  pub fn is_section(&self) -> bool { self.parent_id.is_none() }
}

// ─── Definitions as delivered by the server ──────────────────────────────────

/// A chart definition as fetched from `GET /charts/{uuid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartStructure {
  pub uuid:     Uuid,
  #[serde(default)]
  pub sections: Vec<ChartSectionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSectionDef {
  pub label:        String,
  pub section_type: SectionType,
  /// Explicit sort key; defaults to the section's position.
  #[serde(default)]
  pub weight:       Option<i64>,
  #[serde(default)]
  pub items:        Vec<ChartItemDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartItemDef {
  pub label:          String,
  #[serde(default, rename = "type")]
  pub item_type:      Option<String>,
  #[serde(default)]
  pub required:       bool,
  #[serde(default)]
  pub concept_uuids:  Vec<ConceptUuid>,
  #[serde(default)]
  pub format:         Option<String>,
  #[serde(default)]
  pub caption_format: Option<String>,
  /// Explicit sort key; defaults to the item's position within its section.
  #[serde(default)]
  pub weight:         Option<i64>,
}

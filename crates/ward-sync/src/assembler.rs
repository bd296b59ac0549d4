//! Builds per-patient chart views from the local cache.
//!
//! A view joins the chart structure, concept names in the requested locale
//! (falling back to the default locale, then to the concept uuid), and the
//! patient's observations. A missing translation never fails assembly.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use ward_core::{
  chart::{ChartItem, SectionType},
  concept::ConceptUuid,
  observation::Observation,
  patient::{Order, Patient},
  store::ClinicalStore,
};

use crate::{Error, Result, deadline, session::SessionContext};

// ─── View model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartView {
  pub patient:               Patient,
  /// The patient's location in the requested locale.
  pub location_name:         Option<String>,
  pub sections:              Vec<ChartSection>,
  /// Most recent observation per concept.
  pub latest:                BTreeMap<ConceptUuid, ObservationView>,
  /// Every observation, oldest first.
  pub history:               Vec<ObservationView>,
  pub latest_encounter_time: Option<DateTime<Utc>>,
  pub orders:                Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSection {
  pub label:        String,
  pub section_type: Option<SectionType>,
  pub rows:         Vec<ChartRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartRow {
  pub label:          String,
  pub item_type:      Option<String>,
  pub required:       bool,
  pub format:         Option<String>,
  pub caption_format: Option<String>,
  pub concepts:       Vec<ConceptLabel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptLabel {
  pub uuid: ConceptUuid,
  pub name: String,
}

/// An observation with its concept name and value resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationView {
  #[serde(flatten)]
  pub observation:   Observation,
  pub concept_name:  String,
  /// The value, or the localized name of the answer concept it refers to.
  pub display_value: String,
}

/// Suggested values for a new encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncounterDefaults {
  pub encounter_time: DateTime<Utc>,
  pub clinician_name: Option<String>,
  pub pregnant:       bool,
  pub iv_fitted:      bool,
}

// ─── Latest-value selection ──────────────────────────────────────────────────

/// Ordering used to pick the latest observation of a concept: encounter time,
/// then confirmed over locally-cached, then row id.
fn recency(o: &Observation) -> (DateTime<Utc>, bool, i64) {
  (o.encounter_time, o.is_confirmed(), o.id)
}

/// The most recent observation for each concept in `observations`.
pub fn latest_by_concept<'a>(
  observations: impl IntoIterator<Item = &'a Observation>,
) -> BTreeMap<ConceptUuid, &'a Observation> {
  let mut latest: BTreeMap<ConceptUuid, &Observation> = BTreeMap::new();
  for obs in observations {
    match latest.get(&obs.concept_uuid) {
      Some(current) if recency(current) >= recency(obs) => {}
      _ => {
        latest.insert(obs.concept_uuid.clone(), obs);
      }
    }
  }
  latest
}

// ─── Names ───────────────────────────────────────────────────────────────────

struct ConceptNames(HashMap<ConceptUuid, String>);

impl ConceptNames {
  fn name(&self, uuid: &str) -> String {
    self.0.get(uuid).cloned().unwrap_or_else(|| uuid.to_owned())
  }

  /// Coded values hold the answer concept's uuid; show its name instead.
  fn display_value(&self, value: &str) -> String {
    self.0.get(value).cloned().unwrap_or_else(|| value.to_owned())
  }

  fn view(&self, observation: Observation) -> ObservationView {
    ObservationView {
      concept_name: self.name(&observation.concept_uuid),
      display_value: self.display_value(&observation.value),
      observation,
    }
  }
}

// ─── Assembler ───────────────────────────────────────────────────────────────

pub struct ChartAssembler<S> {
  store:   Arc<S>,
  session: Arc<SessionContext>,
}

impl<S> Clone for ChartAssembler<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), session: self.session.clone() }
  }
}

impl<S: ClinicalStore> ChartAssembler<S> {
  pub fn new(store: Arc<S>, session: Arc<SessionContext>) -> Self { Self { store, session } }

  async fn local<T>(
    &self,
    call: impl std::future::Future<Output = Result<T, S::Error>>,
  ) -> Result<T> {
    deadline::local(self.session.timeouts.commit, call).await
  }

  async fn patient(&self, patient_uuid: Uuid) -> Result<Patient> {
    self
      .local(self.store.get_patient(patient_uuid))
      .await?
      .ok_or(Error::PatientNotFound(patient_uuid))
  }

  async fn concept_names(&self, locale: &str) -> Result<ConceptNames> {
    let default_locale = self.session.default_locale.as_str();
    let mut names: HashMap<ConceptUuid, String> = self
      .local(self.store.concept_names(default_locale))
      .await?
      .into_iter()
      .map(|n| (n.concept_uuid, n.name))
      .collect();
    if locale != default_locale {
      for n in self.local(self.store.concept_names(locale)).await? {
        names.insert(n.concept_uuid, n.name);
      }
    }
    Ok(ConceptNames(names))
  }

  /// Assemble the chart view of one patient in `locale`.
  pub async fn assemble(&self, patient_uuid: Uuid, locale: &str) -> Result<ChartView> {
    let patient = self.patient(patient_uuid).await?;
    let names = self.concept_names(locale).await?;

    let location_name = match patient.location_uuid {
      Some(location_uuid) => self
        .local(self.store.localized_locations(locale, &self.session.default_locale))
        .await?
        .into_iter()
        .find(|l| l.uuid == location_uuid)
        .map(|l| l.name),
      None => None,
    };

    let items = match self.session.primary_chart() {
      Some(chart_uuid) => self.local(self.store.chart_items(chart_uuid)).await?,
      None => Vec::new(),
    };
    let sections = build_sections(items, &names);

    let observations = self.local(self.store.observations_for_patient(patient_uuid)).await?;
    let latest = latest_by_concept(&observations)
      .into_iter()
      .map(|(concept, obs)| (concept, names.view(obs.clone())))
      .collect();
    let latest_encounter_time = observations.iter().map(|o| o.encounter_time).max();
    let history = observations.into_iter().map(|o| names.view(o)).collect();

    let orders = self.local(self.store.orders_for_patient(patient_uuid)).await?;

    tracing::debug!(%patient_uuid, %locale, "chart assembled");
    Ok(ChartView {
      patient,
      location_name,
      sections,
      latest,
      history,
      latest_encounter_time,
      orders,
    })
  }

  /// The latest observation per concept, without names or structure.
  pub async fn most_recent_structured_values(
    &self,
    patient_uuid: Uuid,
  ) -> Result<BTreeMap<ConceptUuid, Observation>> {
    let observations = self.local(self.store.observations_for_patient(patient_uuid)).await?;
    Ok(
      latest_by_concept(&observations)
        .into_iter()
        .map(|(concept, obs)| (concept, obs.clone()))
        .collect(),
    )
  }

  /// Defaults for a new encounter with `patient_uuid`.
  pub async fn prepopulate(&self, patient_uuid: Uuid) -> Result<EncounterDefaults> {
    self.patient(patient_uuid).await?;
    let latest = self.most_recent_structured_values(patient_uuid).await?;
    let concepts = &self.session.concepts;
    let answered_yes = |question: &Option<ConceptUuid>| match (question, &concepts.yes) {
      (Some(question), Some(yes)) => latest.get(question).is_some_and(|o| &o.value == yes),
      _ => false,
    };

    Ok(EncounterDefaults {
      encounter_time: Utc::now(),
      clinician_name: self.session.user.as_ref().map(|u| u.full_name.clone()),
      pregnant:       answered_yes(&concepts.pregnancy),
      iv_fitted:      answered_yes(&concepts.iv_fitted),
    })
  }
}

/// Group stored rows into sections. Rows arrive ordered by weight then
/// insertion, and that order is kept within each section.
fn build_sections(items: Vec<ChartItem>, names: &ConceptNames) -> Vec<ChartSection> {
  let mut sections: Vec<(i64, ChartSection)> = Vec::new();
  let mut rows = Vec::new();
  for item in items {
    if item.is_section() {
      sections.push((item.id, ChartSection {
        label:        item.label,
        section_type: item.section_type,
        rows:         Vec::new(),
      }));
    } else {
      rows.push(item);
    }
  }

  for item in rows {
    let Some((_, section)) = sections.iter_mut().find(|(id, _)| Some(*id) == item.parent_id)
    else {
      tracing::debug!(item = %item.label, "chart item without a section");
      continue;
    };
    section.rows.push(ChartRow {
      concepts:       item
        .concept_uuids
        .iter()
        .map(|uuid| ConceptLabel { uuid: uuid.clone(), name: names.name(uuid) })
        .collect(),
      label:          item.label,
      item_type:      item.item_type,
      required:       item.required,
      format:         item.format,
      caption_format: item.caption_format,
    });
  }

  sections.into_iter().map(|(_, s)| s).collect()
}

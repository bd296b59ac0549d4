//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use uuid::Uuid;
use ward_core::{
  chart::{ChartItemDef, ChartSectionDef, ChartStructure, SectionType},
  concept::{Concept, ConceptName, ConceptType},
  location::{Location, LocationName},
  observation::NewObservation,
  patient::{Gender, Order, Patient, User},
  store::{ClinicalStore, ReferenceSnapshot},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

const TEMP: &str = "5088AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const PULSE: &str = "5087AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

fn patient(uuid: Uuid, location: Option<Uuid>) -> Patient {
  Patient {
    uuid,
    given_name: "Amara".into(),
    family_name: "Kamara".into(),
    location_uuid: location,
    birthdate: chrono::NaiveDate::from_ymd_opt(1990, 4, 2),
    gender: Some(Gender::Female),
  }
}

fn concept(uuid: &str, xform_id: i64) -> Concept {
  Concept {
    uuid: uuid.into(),
    xform_id,
    concept_type: ConceptType::Numeric,
  }
}

fn item(label: &str, weight: Option<i64>) -> ChartItemDef {
  ChartItemDef {
    label:          label.into(),
    item_type:      Some("vital".into()),
    required:       false,
    concept_uuids:  vec![TEMP.into()],
    format:         Some("{1,number,#0.0}".into()),
    caption_format: None,
    weight,
  }
}

/// A snapshot with one location, one patient and two concepts.
fn snapshot(patient_uuid: Uuid, location_uuid: Uuid) -> ReferenceSnapshot {
  ReferenceSnapshot {
    locations: vec![Location { uuid: location_uuid, parent_uuid: None }],
    location_names: vec![LocationName {
      location_uuid,
      locale: "en".into(),
      name: "Triage".into(),
    }],
    concepts: vec![concept(TEMP, 5088), concept(PULSE, 5087)],
    concept_names: vec![
      ConceptName {
        concept_uuid: TEMP.into(),
        locale:       "en".into(),
        name:         "Temperature".into(),
      },
      ConceptName {
        concept_uuid: TEMP.into(),
        locale:       "fr".into(),
        name:         "Température".into(),
      },
    ],
    charts: vec![],
    patients: vec![patient(patient_uuid, Some(location_uuid))],
    orders: vec![],
    users: vec![User { uuid: Uuid::new_v4(), full_name: "Dr. Ngozi".into() }],
  }
}

fn obs(patient_uuid: Uuid, concept: &str, secs: i64, value: &str) -> NewObservation {
  NewObservation {
    uuid: Uuid::new_v4(),
    patient_uuid,
    encounter_uuid: Uuid::new_v4(),
    encounter_time: at(secs),
    concept_uuid: concept.into(),
    value: value.into(),
  }
}

async fn seeded() -> (SqliteStore, Uuid, Uuid) {
  let s = store().await;
  let patient_uuid = Uuid::new_v4();
  let location_uuid = Uuid::new_v4();
  s.replace_reference_tables(snapshot(patient_uuid, location_uuid))
    .await
    .unwrap();
  (s, patient_uuid, location_uuid)
}

// ─── Sync state ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_has_empty_sync_state() {
  let s = store().await;
  let state = s.sync_state().await.unwrap();
  assert_eq!(state.full_sync_start_time, None);
  assert_eq!(state.full_sync_end_time, None);
  assert_eq!(state.obs_sync_time, None);
}

#[tokio::test]
async fn full_sync_markers_roundtrip() {
  let s = store().await;
  s.mark_full_sync_started(at(100)).await.unwrap();
  assert!(s.sync_state().await.unwrap().full_sync_interrupted());

  s.mark_full_sync_finished(at(160)).await.unwrap();
  let state = s.sync_state().await.unwrap();
  assert_eq!(state.full_sync_start_time, Some(at(100)));
  assert_eq!(state.full_sync_end_time, Some(at(160)));
  assert!(!state.full_sync_interrupted());
}

// ─── Reference tables ────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_reference_tables_populates_reads() {
  let (s, patient_uuid, location_uuid) = seeded().await;

  let fetched = s.get_patient(patient_uuid).await.unwrap().unwrap();
  assert_eq!(fetched, patient(patient_uuid, Some(location_uuid)));

  let concepts = s.concepts().await.unwrap();
  assert_eq!(concepts.len(), 2);
  assert!(s.concept_exists(TEMP).await.unwrap());
  assert!(!s.concept_exists("missing").await.unwrap());

  let fr = s.concept_names("fr").await.unwrap();
  assert_eq!(fr.len(), 1);
  assert_eq!(fr[0].name, "Température");

  assert_eq!(s.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn replace_reference_tables_discards_previous_rows() {
  let (s, first_patient, _) = seeded().await;

  let second_patient = Uuid::new_v4();
  s.replace_reference_tables(snapshot(second_patient, Uuid::new_v4()))
    .await
    .unwrap();

  assert!(s.get_patient(first_patient).await.unwrap().is_none());
  assert!(s.get_patient(second_patient).await.unwrap().is_some());
  assert_eq!(s.list_patients(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_replace_leaves_every_table_untouched() {
  let (s, patient_uuid, location_uuid) = seeded().await;

  // Duplicate primary key in the patients table fails the transaction after
  // locations, concepts and names have already been rewritten.
  let dup = Uuid::new_v4();
  let mut bad = snapshot(dup, Uuid::new_v4());
  bad.patients.push(patient(dup, None));

  let err = s.replace_reference_tables(bad).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "unexpected error: {err}");

  assert!(s.get_patient(patient_uuid).await.unwrap().is_some());
  let locations = s.localized_locations("en", "en").await.unwrap();
  assert_eq!(locations.len(), 1);
  assert_eq!(locations[0].uuid, location_uuid);
}

#[tokio::test]
async fn orders_are_returned_by_start_time() {
  let s = store().await;
  let patient_uuid = Uuid::new_v4();
  let mut snap = snapshot(patient_uuid, Uuid::new_v4());
  snap.orders = vec![
    Order {
      uuid:         Uuid::new_v4(),
      patient_uuid,
      instructions: "ORS 1L".into(),
      start_time:   at(500),
      stop_time:    None,
    },
    Order {
      uuid:         Uuid::new_v4(),
      patient_uuid,
      instructions: "Paracetamol 1g".into(),
      start_time:   at(100),
      stop_time:    Some(at(900)),
    },
  ];
  s.replace_reference_tables(snap).await.unwrap();

  let orders = s.orders_for_patient(patient_uuid).await.unwrap();
  let instructions: Vec<_> = orders.iter().map(|o| o.instructions.as_str()).collect();
  assert_eq!(instructions, ["Paracetamol 1g", "ORS 1L"]);
  assert_eq!(orders[0].stop_time, Some(at(900)));
}

// ─── Chart items ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn chart_items_are_ordered_by_weight_then_insertion() {
  let s = store().await;
  let chart_uuid = Uuid::new_v4();
  let mut snap = snapshot(Uuid::new_v4(), Uuid::new_v4());
  snap.charts = vec![ChartStructure {
    uuid:     chart_uuid,
    sections: vec![ChartSectionDef {
      label:        "Vitals".into(),
      section_type: SectionType::GridSection,
      weight:       Some(0),
      items:        vec![
        item("three", Some(3)),
        item("one", Some(1)),
        item("two-a", Some(2)),
        item("two-b", Some(2)),
      ],
    }],
  }];
  s.replace_reference_tables(snap).await.unwrap();

  let rows = s.chart_items(chart_uuid).await.unwrap();
  let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
  assert_eq!(labels, ["Vitals", "one", "two-a", "two-b", "three"]);

  let section = &rows[0];
  assert!(section.is_section());
  assert_eq!(section.section_type, Some(SectionType::GridSection));
  assert!(rows[1..].iter().all(|r| r.parent_id == Some(section.id)));
  assert_eq!(rows[1].concept_uuids, vec![TEMP.to_string()]);
}

#[tokio::test]
async fn chart_item_weights_default_to_position() {
  let s = store().await;
  let chart_uuid = Uuid::new_v4();
  let mut snap = snapshot(Uuid::new_v4(), Uuid::new_v4());
  snap.charts = vec![ChartStructure {
    uuid:     chart_uuid,
    sections: vec![ChartSectionDef {
      label:        "Tiles".into(),
      section_type: SectionType::TileRow,
      weight:       None,
      items:        vec![item("first", None), item("second", None)],
    }],
  }];
  s.replace_reference_tables(snap).await.unwrap();

  let rows = s.chart_items(chart_uuid).await.unwrap();
  let weights: Vec<_> = rows.iter().map(|r| r.weight).collect();
  assert_eq!(weights, [0, 0, 1]);
  assert_eq!(rows[1].label, "first");
}

// ─── Observations ────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_inserts_and_advances_watermark() {
  let (s, p, _) = seeded().await;

  let outcome = s
    .append_observations(vec![obs(p, TEMP, 10, "37.5"), obs(p, PULSE, 10, "88")], at(50))
    .await
    .unwrap();
  assert_eq!(outcome.inserted, 2);
  assert_eq!(outcome.previous_watermark, None);
  assert_eq!(outcome.watermark, Some(at(50)));
  assert!(outcome.watermark_advanced());

  assert_eq!(s.sync_state().await.unwrap().obs_sync_time, Some(at(50)));
  assert_eq!(s.observations_for_patient(p).await.unwrap().len(), 2);
}

#[tokio::test]
async fn watermark_never_moves_backward() {
  let (s, p, _) = seeded().await;
  s.append_observations(vec![], at(100)).await.unwrap();

  let outcome = s
    .append_observations(vec![obs(p, TEMP, 20, "38.0")], at(40))
    .await
    .unwrap();
  assert_eq!(outcome.inserted, 1);
  assert_eq!(outcome.watermark, Some(at(100)));
  assert!(!outcome.watermark_advanced());
  assert_eq!(s.sync_state().await.unwrap().obs_sync_time, Some(at(100)));
}

#[tokio::test]
async fn append_skips_duplicates_and_orphans() {
  let (s, p, _) = seeded().await;
  let first = obs(p, TEMP, 10, "37.5");
  s.append_observations(vec![first.clone()], at(20)).await.unwrap();

  let outcome = s
    .append_observations(
      vec![
        first,
        obs(Uuid::new_v4(), TEMP, 11, "36.9"),
        obs(p, "unknown-concept", 11, "x"),
      ],
      at(30),
    )
    .await
    .unwrap();
  assert_eq!(outcome.inserted, 0);
  assert_eq!(outcome.duplicates, 1);
  assert_eq!(outcome.rejected, 2);
  assert_eq!(s.observations_for_patient(p).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_rows_hold_the_watermark_before_them() {
  let (s, p, _) = seeded().await;
  let newcomer = Uuid::new_v4();

  let outcome = s
    .append_observations(
      vec![
        obs(p, TEMP, 10, "37.5"),
        obs(newcomer, TEMP, 40, "38.0"),
        obs(newcomer, TEMP, 30, "38.4"),
      ],
      at(100),
    )
    .await
    .unwrap();
  assert_eq!((outcome.inserted, outcome.rejected), (1, 2));
  let held = at(30) - TimeDelta::milliseconds(1);
  assert_eq!(outcome.watermark, Some(held));
  assert_eq!(s.sync_state().await.unwrap().obs_sync_time, Some(held));

  // A later clean batch moves it on as usual.
  let outcome = s.append_observations(vec![], at(200)).await.unwrap();
  assert_eq!(outcome.watermark, Some(at(200)));

  // An orphan older than the watermark cannot pull it back.
  let outcome = s
    .append_observations(vec![obs(newcomer, TEMP, 150, "37.0")], at(300))
    .await
    .unwrap();
  assert_eq!(outcome.rejected, 1);
  assert_eq!(outcome.watermark, Some(at(200)));
  assert!(!outcome.watermark_advanced());
}

#[tokio::test]
async fn cached_insert_after_confirmed_copy_keeps_confirmed_row() {
  let (s, p, _) = seeded().await;

  let same_uuid = obs(p, TEMP, 10, "37.5");
  let same_slot = obs(p, PULSE, 10, "88");
  s.append_observations(
    vec![
      same_uuid.clone(),
      NewObservation { uuid: Uuid::new_v4(), ..same_slot.clone() },
    ],
    at(20),
  )
  .await
  .unwrap();

  let fresh = obs(p, TEMP, 12, "37.7");
  let written = s
    .insert_cached_observations(vec![same_uuid.clone(), same_slot, fresh.clone()])
    .await
    .unwrap();

  assert_eq!(written.len(), 3);
  assert_eq!(written[0].uuid, same_uuid.uuid);
  assert!(written[0].is_confirmed());
  assert!(written[1].is_confirmed());
  assert_eq!(written[1].value, "88");
  assert_eq!(written[2].uuid, fresh.uuid);
  assert!(written[2].temp_cache);

  let rows = s.observations_for_patient(p).await.unwrap();
  assert_eq!(rows.len(), 3);
  assert_eq!(rows.iter().filter(|o| o.temp_cache).count(), 1);
}

#[tokio::test]
async fn confirmed_observation_supersedes_cached_copy() {
  let (s, p, _) = seeded().await;

  let cached = obs(p, TEMP, 10, "37.5");
  let written = s.insert_cached_observations(vec![cached.clone()]).await.unwrap();
  assert!(written[0].temp_cache);

  // Same patient, concept and encounter time; different uuid.
  let confirmed = NewObservation { uuid: Uuid::new_v4(), ..cached };
  let outcome = s
    .append_observations(vec![confirmed.clone()], at(20))
    .await
    .unwrap();
  assert_eq!(outcome.superseded, 1);

  let rows = s.observations_for_patient(p).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].uuid, confirmed.uuid);
  assert!(rows[0].is_confirmed());
}

#[tokio::test]
async fn cached_insert_with_orphan_writes_nothing() {
  let (s, p, _) = seeded().await;

  let err = s
    .insert_cached_observations(vec![
      obs(p, TEMP, 10, "37.5"),
      obs(p, "no-such-concept", 10, "1"),
    ])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::OrphanObservation { .. }), "unexpected: {err}");
  assert!(s.observations_for_patient(p).await.unwrap().is_empty());
}

#[tokio::test]
async fn observations_are_ordered_by_encounter_time() {
  let (s, p, _) = seeded().await;
  s.append_observations(
    vec![obs(p, TEMP, 30, "c"), obs(p, TEMP, 10, "a"), obs(p, PULSE, 20, "b")],
    at(40),
  )
  .await
  .unwrap();

  let values: Vec<_> = s
    .observations_for_patient(p)
    .await
    .unwrap()
    .into_iter()
    .map(|o| o.value)
    .collect();
  assert_eq!(values, ["a", "b", "c"]);
}

#[tokio::test]
async fn delete_observation_reports_whether_a_row_was_removed() {
  let (s, p, _) = seeded().await;
  let o = obs(p, TEMP, 10, "37.5");
  s.append_observations(vec![o.clone()], at(20)).await.unwrap();

  assert!(s.get_observation(o.uuid).await.unwrap().is_some());
  assert!(s.delete_observation(o.uuid).await.unwrap());
  assert!(s.get_observation(o.uuid).await.unwrap().is_none());
  assert!(!s.delete_observation(o.uuid).await.unwrap());
}

#[tokio::test]
async fn patient_refresh_replaces_only_that_patients_confirmed_rows() {
  let (s, p, location_uuid) = seeded().await;
  let other = Uuid::new_v4();
  let mut snap = snapshot(p, location_uuid);
  snap.patients.push(patient(other, None));
  s.replace_reference_tables(snap).await.unwrap();

  s.append_observations(vec![obs(p, TEMP, 10, "old"), obs(other, TEMP, 10, "keep")], at(20))
    .await
    .unwrap();
  s.insert_cached_observations(vec![obs(p, PULSE, 15, "cached")])
    .await
    .unwrap();

  let refresh = s
    .replace_patient_observations(p, vec![obs(p, TEMP, 12, "new")])
    .await
    .unwrap();
  assert_eq!(refresh.removed, 1);
  assert_eq!(refresh.inserted, 1);

  let values: Vec<_> = s
    .observations_for_patient(p)
    .await
    .unwrap()
    .into_iter()
    .map(|o| o.value)
    .collect();
  assert_eq!(values, ["new", "cached"]);
  assert_eq!(s.observations_for_patient(other).await.unwrap().len(), 1);
  assert_eq!(s.sync_state().await.unwrap().obs_sync_time, Some(at(20)));
}

// ─── Locations ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn localized_locations_fall_back_and_count_patients() {
  let (s, _, location_uuid) = seeded().await;

  let fr = s.localized_locations("fr", "en").await.unwrap();
  assert_eq!(fr.len(), 1);
  assert_eq!(fr[0].name, "Triage");
  assert_eq!(fr[0].patient_count, 1);

  let none = s.localized_locations("fr", "de").await.unwrap();
  assert_eq!(none[0].name, location_uuid.to_string());

  let at_location = s.list_patients(Some(location_uuid)).await.unwrap();
  assert_eq!(at_location.len(), 1);
  assert!(s.list_patients(Some(Uuid::new_v4())).await.unwrap().is_empty());
}

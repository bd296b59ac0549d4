//! A scripted in-process `ChartServer` and fixtures shared by engine tests.

use std::{
  collections::{BTreeMap, HashMap, VecDeque},
  sync::{Arc, Mutex},
  time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;
use uuid::Uuid;
use ward_core::{
  chart::{ChartItemDef, ChartSectionDef, ChartStructure, SectionType},
  concept::ConceptType,
  patient::{Order, Patient, User},
  remote::{
    ChartServer, ConceptRecord, EncounterObservation, EncounterRecord,
    LocationRecord, NewEncounter, ObservationBatch, PatientChart, RemoteError,
  },
};
use ward_store_sqlite::SqliteStore;

use crate::{Notifier, SessionContext, Timeouts, WriterLocks};

pub const TEMPERATURE: &str = "5088AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
pub const PREGNANT: &str = "5272AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
pub const IV_FITTED: &str = "f50c9c63-3ff9-4c26-9d18-12bfc58a3d07";
pub const YES: &str = "1065AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
pub const NO: &str = "1066AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

/// Blocks one named call until released.
#[derive(Default)]
pub struct Gate {
  pub entered: Notify,
  pub release: Notify,
}

#[derive(Default)]
pub struct FakeServer {
  pub locations:    Mutex<Vec<LocationRecord>>,
  pub concepts:     Mutex<Vec<ConceptRecord>>,
  pub charts:       Mutex<HashMap<Uuid, ChartStructure>>,
  pub patients:     Mutex<Vec<Patient>>,
  pub orders:       Mutex<Vec<Order>>,
  pub users:        Mutex<Vec<User>>,
  /// Served in order by `fetch_observations`.
  pub batches:      Mutex<VecDeque<Result<ObservationBatch, RemoteError>>>,
  pub encounters:   Mutex<HashMap<Uuid, PatientChart>>,
  /// Endpoint name → error returned instead of the scripted value.
  pub failures:     Mutex<HashMap<&'static str, RemoteError>>,
  pub deleted:      Mutex<Vec<Uuid>>,
  pub since_seen:   Mutex<Vec<Option<DateTime<Utc>>>>,
  pub submitted:    Mutex<Vec<NewEncounter>>,
  /// Endpoint name → artificial latency.
  pub delays:       Mutex<HashMap<&'static str, Duration>>,
  pub gate:         Option<Arc<Gate>>,
}

impl FakeServer {
  pub fn fail(&self, endpoint: &'static str, err: RemoteError) {
    self.failures.lock().unwrap().insert(endpoint, err);
  }

  pub fn delay(&self, endpoint: &'static str, by: Duration) {
    self.delays.lock().unwrap().insert(endpoint, by);
  }

  pub fn push_batch(&self, batch: Result<ObservationBatch, RemoteError>) {
    self.batches.lock().unwrap().push_back(batch);
  }

  async fn enter(&self, endpoint: &'static str) -> Result<(), RemoteError> {
    let delay = self.delays.lock().unwrap().get(endpoint).copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    match self.failures.lock().unwrap().get(endpoint) {
      Some(err) => Err(err.clone()),
      None => Ok(()),
    }
  }
}

impl ChartServer for FakeServer {
  async fn fetch_locations(&self) -> Result<Vec<LocationRecord>, RemoteError> {
    if let Some(gate) = &self.gate {
      gate.entered.notify_one();
      gate.release.notified().await;
    }
    self.enter("locations").await?;
    Ok(self.locations.lock().unwrap().clone())
  }

  async fn fetch_concepts(&self) -> Result<Vec<ConceptRecord>, RemoteError> {
    self.enter("concepts").await?;
    Ok(self.concepts.lock().unwrap().clone())
  }

  async fn fetch_chart_structure(
    &self,
    chart_uuid: Uuid,
  ) -> Result<ChartStructure, RemoteError> {
    self.enter("charts").await?;
    self
      .charts
      .lock()
      .unwrap()
      .get(&chart_uuid)
      .cloned()
      .ok_or(RemoteError::Server { status: 404, message: "no such chart".into() })
  }

  async fn fetch_patients(&self) -> Result<Vec<Patient>, RemoteError> {
    self.enter("patients").await?;
    Ok(self.patients.lock().unwrap().clone())
  }

  async fn fetch_orders(&self) -> Result<Vec<Order>, RemoteError> {
    self.enter("orders").await?;
    Ok(self.orders.lock().unwrap().clone())
  }

  async fn fetch_users(&self) -> Result<Vec<User>, RemoteError> {
    self.enter("users").await?;
    Ok(self.users.lock().unwrap().clone())
  }

  async fn fetch_observations(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> Result<ObservationBatch, RemoteError> {
    self.since_seen.lock().unwrap().push(since);
    self.enter("observations").await?;
    let next = self.batches.lock().unwrap().pop_front();
    next.unwrap_or_else(|| {
      Ok(ObservationBatch { snapshot_time: since.unwrap_or(at(0)), observations: vec![] })
    })
  }

  async fn fetch_chart(&self, patient_uuid: Uuid) -> Result<PatientChart, RemoteError> {
    self.enter("patientencounters").await?;
    Ok(
      self
        .encounters
        .lock()
        .unwrap()
        .get(&patient_uuid)
        .cloned()
        .unwrap_or(PatientChart { uuid: patient_uuid, encounters: vec![] }),
    )
  }

  async fn submit_encounter(
    &self,
    encounter: NewEncounter,
  ) -> Result<EncounterRecord, RemoteError> {
    self.enter("encounters").await?;
    self.submitted.lock().unwrap().push(encounter.clone());
    Ok(EncounterRecord {
      uuid:         Uuid::new_v4(),
      timestamp:    encounter.timestamp,
      observations: encounter
        .observations
        .into_iter()
        .map(|o| EncounterObservation {
          uuid:         Uuid::new_v4(),
          concept_uuid: o.concept_uuid,
          value:        o.value,
        })
        .collect(),
    })
  }

  async fn delete_observation(&self, uuid: Uuid) -> Result<(), RemoteError> {
    self.enter("delete").await?;
    self.deleted.lock().unwrap().push(uuid);
    Ok(())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub struct Fixture {
  pub chart:     Uuid,
  pub site:      Uuid,
  pub ward:      Uuid,
  pub patient:   Patient,
  pub clinician: User,
}

fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
  pairs.iter().map(|(l, n)| (l.to_string(), n.to_string())).collect()
}

fn concept(uuid: &str, xform_id: i64, concept_type: ConceptType, en: &str) -> ConceptRecord {
  ConceptRecord {
    uuid: uuid.into(),
    xform_id,
    concept_type,
    names: names(&[("en", en)]),
  }
}

fn item(label: &str, weight: Option<i64>, concepts: &[&str]) -> ChartItemDef {
  ChartItemDef {
    label:          label.into(),
    item_type:      Some("TEXT".into()),
    required:       true,
    concept_uuids:  concepts.iter().map(|c| c.to_string()).collect(),
    format:         None,
    caption_format: None,
    weight,
  }
}

/// Populate `server` with a small but complete reference data set.
pub fn seed(server: &FakeServer) -> Fixture {
  let (chart, site, ward) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let patient = Patient {
    uuid:          Uuid::new_v4(),
    given_name:    "Amara".into(),
    family_name:   "Kamara".into(),
    location_uuid: Some(ward),
    birthdate:     None,
    gender:        None,
  };
  let clinician = User { uuid: Uuid::new_v4(), full_name: "Dr. Sesay".into() };

  *server.locations.lock().unwrap() = vec![
    LocationRecord {
      uuid:        site,
      parent_uuid: None,
      names:       names(&[("en", "Facility"), ("fr", "Établissement")]),
    },
    LocationRecord {
      uuid:        ward,
      parent_uuid: Some(site),
      names:       names(&[("en", "Triage")]),
    },
  ];
  *server.concepts.lock().unwrap() = vec![
    concept(TEMPERATURE, 5088, ConceptType::Numeric, "Temperature"),
    concept(PREGNANT, 5272, ConceptType::Coded, "Pregnant"),
    concept(IV_FITTED, 9001, ConceptType::Coded, "IV fitted"),
    ConceptRecord {
      names: names(&[("en", "Yes"), ("fr", "Oui")]),
      ..concept(YES, 1065, ConceptType::None, "Yes")
    },
    concept(NO, 1066, ConceptType::None, "No"),
  ];
  server.charts.lock().unwrap().insert(chart, ChartStructure {
    uuid:     chart,
    sections: vec![ChartSectionDef {
      label:        "Vitals".into(),
      section_type: SectionType::GridSection,
      weight:       None,
      items:        vec![
        item("three", Some(3), &[TEMPERATURE]),
        item("one", Some(1), &[PREGNANT]),
        item("two", Some(2), &[IV_FITTED]),
      ],
    }],
  });
  *server.patients.lock().unwrap() = vec![patient.clone()];
  *server.orders.lock().unwrap() = vec![Order {
    uuid:         Uuid::new_v4(),
    patient_uuid: patient.uuid,
    instructions: "Paracetamol 1g".into(),
    start_time:   at(1_000),
    stop_time:    None,
  }];
  *server.users.lock().unwrap() = vec![clinician.clone()];

  Fixture { chart, site, ward, patient, clinician }
}

pub fn session(fixture: &Fixture) -> Arc<SessionContext> {
  let mut session = SessionContext::new("http://fake");
  session.chart_uuids = vec![fixture.chart];
  session.user = Some(fixture.clinician.clone());
  session.concepts.pregnancy = Some(PREGNANT.into());
  session.concepts.iv_fitted = Some(IV_FITTED.into());
  session.concepts.yes = Some(YES.into());
  session.timeouts = Timeouts {
    request: Duration::from_millis(500),
    commit:  Duration::from_secs(5),
  };
  Arc::new(session)
}

/// Everything an engine test needs, wired the way a binary would wire it.
pub struct Harness {
  pub store:    Arc<SqliteStore>,
  pub server:   Arc<FakeServer>,
  pub session:  Arc<SessionContext>,
  pub locks:    WriterLocks,
  pub notifier: Notifier,
  pub fixture:  Fixture,
}

pub async fn harness_with(server: FakeServer) -> Harness {
  let fixture = seed(&server);
  Harness {
    store: Arc::new(SqliteStore::open_in_memory().await.unwrap()),
    server: Arc::new(server),
    session: session(&fixture),
    locks: WriterLocks::default(),
    notifier: Notifier::default(),
    fixture,
  }
}

pub async fn harness() -> Harness { harness_with(FakeServer::default()).await }

//! Wires the engine components together and implements each command.

use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use uuid::Uuid;
use ward_client::HttpChartServer;
use ward_core::{
  remote::{NewEncounter, ObservationValue},
  store::ClinicalStore,
};
use ward_store_sqlite::SqliteStore;
use ward_sync::{
  CancellationToken, ChartAssembler, LocationTree, MutationQueue, Notifier,
  SessionContext, SyncCoordinator, TaskHandle, WriterLocks,
};

use crate::settings::WardConfig;

type Coordinator = SyncCoordinator<SqliteStore, HttpChartServer>;
type Mutations = MutationQueue<SqliteStore, HttpChartServer>;

pub struct App {
  store:     Arc<SqliteStore>,
  session:   Arc<SessionContext>,
  notifier:  Notifier,
  sync:      Coordinator,
  mutations: Mutations,
  assembler: ChartAssembler<SqliteStore>,
}

/// One line of `ward locations`.
#[derive(Serialize)]
struct LocationLine<'a> {
  depth:            usize,
  uuid:             Uuid,
  name:             &'a str,
  patients:         u32,
  subtree_patients: u32,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Wait for a background operation, cancelling it on Ctrl-C.
async fn wait<T: Send + 'static>(handle: TaskHandle<ward_sync::Result<T>>) -> Result<T> {
  let token = handle.cancellation_token();
  let interrupt = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::info!("interrupt received; stopping at the next checkpoint");
      token.cancel();
    }
  });
  let result = handle.join().await;
  interrupt.abort();
  Ok(result??)
}

impl App {
  pub async fn open(cfg: WardConfig) -> Result<Self> {
    let timeouts = cfg.timeouts();
    let store = SqliteStore::open(&cfg.store_path)
      .await
      .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
    let store = Arc::new(store);
    let server = HttpChartServer::new(cfg.server.clone(), timeouts.request)
      .context("invalid server configuration")?;
    let server = Arc::new(server);

    let user = match cfg.user_uuid {
      Some(uuid) => {
        let user = store.list_users().await?.into_iter().find(|u| u.uuid == uuid);
        if user.is_none() {
          tracing::warn!(%uuid, "configured user is not cached; run a full sync");
        }
        user
      }
      None => None,
    };

    let session = Arc::new(SessionContext {
      server_url: cfg.server.base_url.clone(),
      user,
      locale: cfg.locale,
      default_locale: cfg.default_locale,
      chart_uuids: cfg.chart_uuids,
      concepts: cfg.concepts,
      timeouts,
    });
    tracing::debug!(server = %session.server_url, locale = %session.locale, "session ready");

    let locks = WriterLocks::default();
    let notifier = Notifier::default();
    let sync = SyncCoordinator::new(
      store.clone(),
      server.clone(),
      session.clone(),
      locks.clone(),
      notifier.clone(),
    );
    let mutations =
      MutationQueue::new(store.clone(), server, session.clone(), locks, notifier.clone());
    let assembler = ChartAssembler::new(store.clone(), session.clone());

    Ok(Self { store, session, notifier, sync, mutations, assembler })
  }

  /// Log every engine event until the notifier is dropped.
  pub fn log_events(&self) -> JoinHandle<()> {
    let mut rx = self.notifier.subscribe();
    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(event) => match event.failure() {
            Some(kind) => tracing::debug!(code = kind.code(), ?event, "failure event"),
            None => tracing::debug!(?event, "event"),
          },
          Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event log lagged"),
          Err(RecvError::Closed) => break,
        }
      }
    })
  }

  // ─── Sync ──────────────────────────────────────────────────────────────────

  pub async fn full_sync(&self) -> Result<()> {
    let handle = self.sync.spawn_full_sync(|result| {
      tracing::debug!(ok = result.is_ok(), "full sync task complete");
    });
    let finished_at = wait(handle).await?;
    print_json(&serde_json::json!({ "finished_at": finished_at }))
  }

  pub async fn observation_sync(&self) -> Result<()> {
    let handle = self.sync.spawn_incremental_observation_sync(|result| {
      tracing::debug!(ok = result.is_ok(), "observation sync task complete");
    });
    print_json(&wait(handle).await?)
  }

  pub async fn refresh_patient(&self, patient: Uuid) -> Result<()> {
    print_json(&self.sync.refresh_patient(patient).await?)
  }

  pub async fn status(&self) -> Result<()> { print_json(&self.sync.status().await?) }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  pub async fn patients(&self, location: Option<Uuid>) -> Result<()> {
    print_json(&self.store.list_patients(location).await?)
  }

  pub async fn locations(&self) -> Result<()> {
    let locations = self
      .store
      .localized_locations(&self.session.locale, &self.session.default_locale)
      .await?;
    let tree = LocationTree::build(locations)?;
    let lines: Vec<_> = tree
      .depth_first()
      .into_iter()
      .map(|(depth, loc)| LocationLine {
        depth,
        uuid: loc.uuid,
        name: &loc.name,
        patients: loc.patient_count,
        subtree_patients: tree.subtree_patient_count(loc.uuid),
      })
      .collect();
    print_json(&lines)
  }

  pub async fn chart(&self, patient: Uuid) -> Result<()> {
    print_json(&self.assembler.assemble(patient, &self.session.locale).await?)
  }

  pub async fn prepopulate(&self, patient: Uuid) -> Result<()> {
    print_json(&self.assembler.prepopulate(patient).await?)
  }

  // ─── Mutations ─────────────────────────────────────────────────────────────

  pub async fn submit(&self, patient: Uuid, values: &[String]) -> Result<()> {
    let observations = values
      .iter()
      .map(|pair| -> Result<ObservationValue> {
        let (concept_uuid, value) = pair
          .split_once('=')
          .ok_or_else(|| anyhow!("expected CONCEPT=VALUE, got {pair:?}"))?;
        Ok(ObservationValue { concept_uuid: concept_uuid.into(), value: value.into() })
      })
      .collect::<Result<Vec<_>>>()?;
    let encounter = NewEncounter { patient_uuid: patient, timestamp: Utc::now(), observations };

    let rows = self
      .mutations
      .submit_encounter(encounter, &CancellationToken::new())
      .await?;
    print_json(&rows)
  }

  pub async fn void(&self, observation: Uuid) -> Result<()> {
    let handle = self.mutations.spawn_void_observation(observation, |result| {
      tracing::debug!(ok = result.is_ok(), "void task complete");
    });
    wait(handle).await?;
    print_json(&serde_json::json!({ "voided": observation }))
  }
}

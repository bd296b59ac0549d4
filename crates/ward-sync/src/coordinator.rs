//! Full and incremental synchronisation against the clinical server.
//!
//! At most one sync (of either kind) runs at a time; a second caller gets
//! [`Error::Busy`] before anything is read or written. A full sync fetches
//! every reference set first, checking for cancellation between steps, and
//! then replaces all reference tables in one transaction. An incremental sync
//! appends observations newer than the watermark and moves the watermark
//! forward in the same transaction.

use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use ward_core::{
  remote::ChartServer,
  store::{AppendOutcome, ClinicalStore, PatientRefresh, ReferenceSnapshot, ReferenceTable},
  sync_state::SyncState,
};

use crate::{
  Error, Result, deadline,
  events::{Event, Notifier, SyncKind},
  locations,
  locks::WriterLocks,
  session::SessionContext,
  task::TaskHandle,
};

/// Snapshot of the engine's sync progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
  pub state:       SyncState,
  pub in_flight:   bool,
  /// A previous full sync started and never finished.
  pub interrupted: bool,
}

pub struct SyncCoordinator<S, R> {
  store:     Arc<S>,
  server:    Arc<R>,
  session:   Arc<SessionContext>,
  locks:     WriterLocks,
  notifier:  Notifier,
  in_flight: Arc<Mutex<()>>,
}

impl<S, R> Clone for SyncCoordinator<S, R> {
  fn clone(&self) -> Self {
    Self {
      store:     self.store.clone(),
      server:    self.server.clone(),
      session:   self.session.clone(),
      locks:     self.locks.clone(),
      notifier:  self.notifier.clone(),
      in_flight: self.in_flight.clone(),
    }
  }
}

fn checkpoint(cancel: &CancellationToken, next: impl Display) -> Result<()> {
  if cancel.is_cancelled() {
    tracing::info!(%next, "sync cancelled before step");
    return Err(Error::Cancelled);
  }
  Ok(())
}

impl<S, R> SyncCoordinator<S, R>
where
  S: ClinicalStore + 'static,
  R: ChartServer + 'static,
{
  pub fn new(
    store: Arc<S>,
    server: Arc<R>,
    session: Arc<SessionContext>,
    locks: WriterLocks,
    notifier: Notifier,
  ) -> Self {
    Self {
      store,
      server,
      session,
      locks,
      notifier,
      in_flight: Arc::new(Mutex::new(())),
    }
  }

  fn begin(&self) -> Result<OwnedMutexGuard<()>> {
    self.in_flight.clone().try_lock_owned().map_err(|_| {
      tracing::debug!("sync requested while another is running");
      Error::Busy
    })
  }

  pub async fn status(&self) -> Result<SyncStatus> {
    let state =
      deadline::local(self.session.timeouts.commit, self.store.sync_state()).await?;
    let in_flight = self.in_flight.try_lock().is_err();
    Ok(SyncStatus {
      // A full sync that is still running has a start time and no end time.
      interrupted: !in_flight && state.full_sync_interrupted(),
      in_flight,
      state,
    })
  }

  // ─── Full sync ─────────────────────────────────────────────────────────────

  /// Replace every reference table from the server. Returns the recorded end
  /// time.
  pub async fn run_full_sync(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
    let _in_flight = self.begin()?;
    tracing::info!("full sync started");
    self.notifier.publish(Event::SyncStarted { kind: SyncKind::Full });

    match self.full_sync(cancel).await {
      Ok(finished_at) => {
        tracing::info!(%finished_at, "full sync finished");
        self.notifier.publish(Event::FullSyncCompleted { finished_at });
        Ok(finished_at)
      }
      Err(err) => {
        tracing::warn!(error = %err, kind = %err.kind(), "full sync failed");
        self.notifier.publish(Event::sync_failed(SyncKind::Full, &err));
        Err(err)
      }
    }
  }

  pub fn spawn_full_sync<C>(&self, on_complete: C) -> TaskHandle<Result<DateTime<Utc>>>
  where
    C: FnOnce(&Result<DateTime<Utc>>) + Send + 'static,
  {
    let this = self.clone();
    TaskHandle::spawn(
      CancellationToken::new(),
      move |cancel| async move { this.run_full_sync(&cancel).await },
      on_complete,
    )
  }

  async fn full_sync(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
    let commit = self.session.timeouts.commit;

    deadline::local(commit, self.store.mark_full_sync_started(Utc::now())).await?;

    let snapshot = self.fetch_snapshot(cancel).await?;
    locations::validate(&snapshot.locations)?;
    checkpoint(cancel, "commit")?;

    {
      let _writer = self.locks.reference().await;
      deadline::local(commit, self.store.replace_reference_tables(snapshot)).await?;
    }

    let finished_at = Utc::now();
    deadline::local(commit, self.store.mark_full_sync_finished(finished_at)).await?;
    Ok(finished_at)
  }

  async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<ReferenceSnapshot> {
    let limit = self.session.timeouts.request;
    let server = &self.server;
    let mut snapshot = ReferenceSnapshot::default();

    checkpoint(cancel, ReferenceTable::Locations)?;
    let locations = deadline::remote(limit, server.fetch_locations()).await?;
    snapshot.locations = locations.iter().map(|l| l.location()).collect();
    snapshot.location_names =
      locations.iter().flat_map(|l| l.localized_names()).collect();
    log_step(&snapshot, ReferenceTable::Locations);

    checkpoint(cancel, ReferenceTable::Concepts)?;
    let concepts = deadline::remote(limit, server.fetch_concepts()).await?;
    snapshot.concepts = concepts.iter().map(|c| c.concept()).collect();
    snapshot.concept_names = concepts.iter().flat_map(|c| c.localized_names()).collect();
    log_step(&snapshot, ReferenceTable::Concepts);

    for chart_uuid in &self.session.chart_uuids {
      checkpoint(cancel, ReferenceTable::ChartItems)?;
      let chart = deadline::remote(limit, server.fetch_chart_structure(*chart_uuid)).await?;
      snapshot.charts.push(chart);
    }
    log_step(&snapshot, ReferenceTable::ChartItems);

    checkpoint(cancel, ReferenceTable::Patients)?;
    snapshot.patients = deadline::remote(limit, server.fetch_patients()).await?;
    log_step(&snapshot, ReferenceTable::Patients);

    checkpoint(cancel, ReferenceTable::Orders)?;
    snapshot.orders = deadline::remote(limit, server.fetch_orders()).await?;
    log_step(&snapshot, ReferenceTable::Orders);

    checkpoint(cancel, ReferenceTable::Users)?;
    snapshot.users = deadline::remote(limit, server.fetch_users()).await?;
    log_step(&snapshot, ReferenceTable::Users);

    Ok(snapshot)
  }

  // ─── Incremental observation sync ──────────────────────────────────────────

  /// Append observations recorded since the watermark.
  pub async fn run_incremental_observation_sync(
    &self,
    cancel: &CancellationToken,
  ) -> Result<AppendOutcome> {
    let _in_flight = self.begin()?;
    self.notifier.publish(Event::SyncStarted { kind: SyncKind::Observations });

    match self.incremental(cancel).await {
      Ok(outcome) => {
        self.notifier.publish(Event::ObservationSyncCompleted { outcome: outcome.clone() });
        Ok(outcome)
      }
      Err(err) => {
        tracing::warn!(error = %err, kind = %err.kind(), "observation sync failed");
        self.notifier.publish(Event::sync_failed(SyncKind::Observations, &err));
        Err(err)
      }
    }
  }

  pub fn spawn_incremental_observation_sync<C>(
    &self,
    on_complete: C,
  ) -> TaskHandle<Result<AppendOutcome>>
  where
    C: FnOnce(&Result<AppendOutcome>) + Send + 'static,
  {
    let this = self.clone();
    TaskHandle::spawn(
      CancellationToken::new(),
      move |cancel| async move { this.run_incremental_observation_sync(&cancel).await },
      on_complete,
    )
  }

  async fn incremental(&self, cancel: &CancellationToken) -> Result<AppendOutcome> {
    let timeouts = self.session.timeouts;

    let state = deadline::local(timeouts.commit, self.store.sync_state()).await?;
    checkpoint(cancel, "fetch observations")?;
    let batch =
      deadline::remote(timeouts.request, self.server.fetch_observations(state.obs_sync_time))
        .await?;
    checkpoint(cancel, "append observations")?;

    let snapshot_time = batch.snapshot_time;
    let fetched = batch.observations.len();
    let outcome = {
      let _writer = self.locks.observations().await;
      deadline::local(
        timeouts.commit,
        self.store.append_observations(batch.observations, snapshot_time),
      )
      .await?
    };

    if let Some(watermark) = outcome.previous_watermark {
      if snapshot_time < watermark {
        tracing::warn!(
          %watermark,
          reported = %snapshot_time,
          "server snapshot is older than the watermark; keeping watermark"
        );
        self.notifier.publish(Event::WatermarkRegressed { watermark, reported: snapshot_time });
      }
    }
    if outcome.rejected > 0 {
      tracing::warn!(
        rejected = outcome.rejected,
        watermark = ?outcome.watermark,
        "skipped observations referencing uncached patients or concepts; \
         watermark held so they are fetched again"
      );
    }
    tracing::info!(
      fetched,
      inserted = outcome.inserted,
      duplicates = outcome.duplicates,
      superseded = outcome.superseded,
      watermark = ?outcome.watermark,
      "observation sync committed"
    );
    Ok(outcome)
  }

  // ─── Single patient ────────────────────────────────────────────────────────

  /// Re-fetch one patient's encounters and replace their confirmed
  /// observations. The watermark is not moved.
  pub async fn refresh_patient(&self, patient_uuid: Uuid) -> Result<PatientRefresh> {
    match self.refresh(patient_uuid).await {
      Ok(refresh) => {
        tracing::info!(%patient_uuid, ?refresh, "patient refreshed");
        self
          .notifier
          .publish(Event::PatientRefreshed { patient_uuid, refresh: refresh.clone() });
        Ok(refresh)
      }
      Err(err) => {
        tracing::warn!(%patient_uuid, error = %err, "patient refresh failed");
        self.notifier.publish(Event::PatientRefreshFailed {
          patient_uuid,
          failure: err.kind(),
          reason: err.to_string(),
        });
        Err(err)
      }
    }
  }

  async fn refresh(&self, patient_uuid: Uuid) -> Result<PatientRefresh> {
    let timeouts = self.session.timeouts;
    deadline::local(timeouts.commit, self.store.get_patient(patient_uuid))
      .await?
      .ok_or(Error::PatientNotFound(patient_uuid))?;

    let chart =
      deadline::remote(timeouts.request, self.server.fetch_chart(patient_uuid)).await?;
    let observations = chart.into_observations();

    let _writer = self.locks.observations().await;
    deadline::local(
      timeouts.commit,
      self.store.replace_patient_observations(patient_uuid, observations),
    )
    .await
  }
}

fn log_step(snapshot: &ReferenceSnapshot, table: ReferenceTable) {
  tracing::info!(%table, rows = snapshot.row_count(table), "fetched");
}

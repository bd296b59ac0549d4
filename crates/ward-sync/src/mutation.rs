//! Locally-initiated writes, confirmed by the server before they touch the
//! local cache.
//!
//! The cache only ever reflects what the server has accepted: a void removes
//! the row after the server confirms the delete, and a submitted encounter is
//! cached only once the server has returned it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use ward_core::{
  observation::Observation,
  remote::{ChartServer, NewEncounter},
  store::ClinicalStore,
};

use crate::{
  Error, Result, deadline,
  events::{Event, Notifier},
  locks::WriterLocks,
  session::SessionContext,
  task::TaskHandle,
};

pub struct MutationQueue<S, R> {
  store:    Arc<S>,
  server:   Arc<R>,
  session:  Arc<SessionContext>,
  locks:    WriterLocks,
  notifier: Notifier,
}

impl<S, R> Clone for MutationQueue<S, R> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      server:   self.server.clone(),
      session:  self.session.clone(),
      locks:    self.locks.clone(),
      notifier: self.notifier.clone(),
    }
  }
}

impl<S, R> MutationQueue<S, R>
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
    Self { store, server, session, locks, notifier }
  }

  // ─── Void ──────────────────────────────────────────────────────────────────

  /// Delete an observation on the server, then locally.
  ///
  /// Publishes exactly one [`Event::ObservationDeleted`] on success or one
  /// [`Event::VoidFailed`] otherwise. A failed void leaves the cached row in
  /// place.
  pub async fn void_observation(&self, uuid: Uuid, cancel: &CancellationToken) -> Result<()> {
    match self.void(uuid, cancel).await {
      Ok(()) => {
        tracing::info!(%uuid, "observation voided");
        self.notifier.publish(Event::ObservationDeleted { uuid });
        Ok(())
      }
      Err(err) => {
        tracing::warn!(%uuid, error = %err, kind = %err.kind(), "void failed");
        self.notifier.publish(Event::VoidFailed {
          uuid,
          failure: err.kind(),
          reason: err.to_string(),
        });
        Err(err)
      }
    }
  }

  pub fn spawn_void_observation<C>(&self, uuid: Uuid, on_complete: C) -> TaskHandle<Result<()>>
  where
    C: FnOnce(&Result<()>) + Send + 'static,
  {
    let this = self.clone();
    TaskHandle::spawn(
      CancellationToken::new(),
      move |cancel| async move { this.void_observation(uuid, &cancel).await },
      on_complete,
    )
  }

  async fn void(&self, uuid: Uuid, cancel: &CancellationToken) -> Result<()> {
    let timeouts = self.session.timeouts;

    // The server delete is idempotent, so it goes out whether or not the row
    // is cached here.
    tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(Error::Cancelled),
      result = deadline::remote(timeouts.request, self.server.delete_observation(uuid)) => result?,
    }

    let _writer = self.locks.observations().await;
    let removed = deadline::local(timeouts.commit, self.store.delete_observation(uuid)).await?;
    if !removed {
      tracing::debug!(%uuid, "row already gone locally");
    }
    Ok(())
  }

  // ─── Encounters ────────────────────────────────────────────────────────────

  /// Post an encounter and cache the observations the server returns as
  /// locally-cached rows, pending the next incremental sync.
  pub async fn submit_encounter(
    &self,
    encounter: NewEncounter,
    cancel: &CancellationToken,
  ) -> Result<Vec<Observation>> {
    let patient_uuid = encounter.patient_uuid;
    match self.submit(encounter, cancel).await {
      Ok((encounter_uuid, rows)) => {
        tracing::info!(%patient_uuid, %encounter_uuid, rows = rows.len(), "encounter submitted");
        self.notifier.publish(Event::EncounterSubmitted {
          patient_uuid,
          encounter_uuid,
          observations: rows.len(),
        });
        Ok(rows)
      }
      Err(err) => {
        tracing::warn!(%patient_uuid, error = %err, "encounter submission failed");
        self.notifier.publish(Event::EncounterFailed {
          patient_uuid,
          failure: err.kind(),
          reason: err.to_string(),
        });
        Err(err)
      }
    }
  }

  async fn submit(
    &self,
    encounter: NewEncounter,
    cancel: &CancellationToken,
  ) -> Result<(Uuid, Vec<Observation>)> {
    let timeouts = self.session.timeouts;
    let patient_uuid = encounter.patient_uuid;

    deadline::local(timeouts.commit, self.store.get_patient(patient_uuid))
      .await?
      .ok_or(Error::PatientNotFound(patient_uuid))?;
    for value in &encounter.observations {
      let known =
        deadline::local(timeouts.commit, self.store.concept_exists(&value.concept_uuid)).await?;
      if !known {
        return Err(Error::ConceptNotFound(value.concept_uuid.clone()));
      }
    }

    let record = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(Error::Cancelled),
      result = deadline::remote(timeouts.request, self.server.submit_encounter(encounter)) => result?,
    };
    let encounter_uuid = record.uuid;

    let _writer = self.locks.observations().await;
    let rows = deadline::local(
      timeouts.commit,
      self.store.insert_cached_observations(record.into_observations(patient_uuid)),
    )
    .await?;
    Ok((encounter_uuid, rows))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use ward_core::{
    observation::NewObservation,
    remote::{ObservationBatch, ObservationValue, RemoteError},
  };
  use ward_store_sqlite::SqliteStore;

  use super::*;
  use crate::{
    FailureKind, SyncCoordinator,
    testing::{FakeServer, Harness, TEMPERATURE, at, harness, harness_with},
  };

  fn queue(h: &Harness) -> MutationQueue<SqliteStore, FakeServer> {
    MutationQueue::new(
      h.store.clone(),
      h.server.clone(),
      h.session.clone(),
      h.locks.clone(),
      h.notifier.clone(),
    )
  }

  /// Full sync plus one confirmed temperature observation; returns its uuid.
  async fn synced_with_observation(h: &Harness) -> Uuid {
    let sync = SyncCoordinator::new(
      h.store.clone(),
      h.server.clone(),
      h.session.clone(),
      h.locks.clone(),
      h.notifier.clone(),
    );
    sync.run_full_sync(&CancellationToken::new()).await.unwrap();
    let uuid = Uuid::new_v4();
    h.server.push_batch(Ok(ObservationBatch {
      snapshot_time: at(100),
      observations:  vec![NewObservation {
        uuid,
        patient_uuid: h.fixture.patient.uuid,
        encounter_uuid: Uuid::new_v4(),
        encounter_time: at(50),
        concept_uuid: TEMPERATURE.into(),
        value: "38.0".into(),
      }],
    }));
    sync.run_incremental_observation_sync(&CancellationToken::new()).await.unwrap();
    uuid
  }

  fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
  }

  // ─── Void ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn successful_void_removes_row_and_notifies_once() {
    let h = harness().await;
    let uuid = synced_with_observation(&h).await;
    let mut events = h.notifier.subscribe();

    queue(&h).void_observation(uuid, &CancellationToken::new()).await.unwrap();

    assert_eq!(h.store.get_observation(uuid).await.unwrap(), None);
    assert_eq!(*h.server.deleted.lock().unwrap(), vec![uuid]);
    assert_eq!(drain(&mut events), vec![Event::ObservationDeleted { uuid }]);
  }

  #[tokio::test]
  async fn transport_failure_keeps_row() {
    let h = harness().await;
    let uuid = synced_with_observation(&h).await;
    h.server.fail("delete", RemoteError::Transport("network unreachable".into()));
    let mut events = h.notifier.subscribe();

    let err = queue(&h).void_observation(uuid, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transport);
    assert!(h.store.get_observation(uuid).await.unwrap().is_some());
    match drain(&mut events).as_slice() {
      [Event::VoidFailed { uuid: failed, failure, .. }] => {
        assert_eq!(*failed, uuid);
        assert_eq!(*failure, FailureKind::Transport);
      }
      other => panic!("unexpected events {other:?}"),
    }
  }

  #[tokio::test]
  async fn server_failure_is_reported_as_unknown_server_error() {
    let h = harness().await;
    let uuid = synced_with_observation(&h).await;
    h.server.fail("delete", RemoteError::Server { status: 500, message: "boom".into() });

    let err = queue(&h).void_observation(uuid, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::UnknownServerError);
    assert!(h.store.get_observation(uuid).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn cancelled_void_is_interrupted_and_keeps_row() {
    let server = FakeServer::default();
    server.delay("delete", Duration::from_millis(300));
    let h = harness_with(server).await;
    let uuid = synced_with_observation(&h).await;

    let handle = queue(&h).spawn_void_observation(uuid, |_| {});
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let err = handle.join().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), FailureKind::Interrupted);
    assert!(h.store.get_observation(uuid).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn voiding_an_uncached_observation_still_deletes_on_the_server() {
    let h = harness().await;
    let uuid = Uuid::new_v4();
    let mut events = h.notifier.subscribe();

    queue(&h).void_observation(uuid, &CancellationToken::new()).await.unwrap();

    assert_eq!(*h.server.deleted.lock().unwrap(), vec![uuid]);
    assert_eq!(drain(&mut events), vec![Event::ObservationDeleted { uuid }]);
  }

  // ─── Encounters ────────────────────────────────────────────────────────────

  fn encounter(h: &Harness, concept: &str) -> NewEncounter {
    NewEncounter {
      patient_uuid: h.fixture.patient.uuid,
      timestamp:    at(500),
      observations: vec![ObservationValue {
        concept_uuid: concept.into(),
        value:        "37.9".into(),
      }],
    }
  }

  #[tokio::test]
  async fn submitted_encounter_is_cached_pending_confirmation() {
    let h = harness().await;
    synced_with_observation(&h).await;
    let mut events = h.notifier.subscribe();

    let rows = queue(&h)
      .submit_encounter(encounter(&h, TEMPERATURE), &CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(rows.len(), 1);
    assert!(rows[0].temp_cache);
    assert_eq!(rows[0].encounter_time, at(500));
    let cached = h.store.get_observation(rows[0].uuid).await.unwrap().unwrap();
    assert!(!cached.is_confirmed());
    match drain(&mut events).as_slice() {
      [Event::EncounterSubmitted { observations: 1, .. }] => {}
      other => panic!("unexpected events {other:?}"),
    }
  }

  #[tokio::test]
  async fn submission_already_pulled_by_a_sync_still_succeeds() {
    let h = harness().await;
    synced_with_observation(&h).await;

    // A sync that ran between the POST and the local write stored the
    // confirmed copy first.
    let confirmed = NewObservation {
      uuid:           Uuid::new_v4(),
      patient_uuid:   h.fixture.patient.uuid,
      encounter_uuid: Uuid::new_v4(),
      encounter_time: at(500),
      concept_uuid:   TEMPERATURE.into(),
      value:          "37.9".into(),
    };
    h.store.append_observations(vec![confirmed.clone()], at(600)).await.unwrap();
    let mut events = h.notifier.subscribe();

    let rows = queue(&h)
      .submit_encounter(encounter(&h, TEMPERATURE), &CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].uuid, confirmed.uuid);
    assert!(rows[0].is_confirmed());
    let stored = h.store.observations_for_patient(h.fixture.patient.uuid).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(Observation::is_confirmed));
    match drain(&mut events).as_slice() {
      [Event::EncounterSubmitted { observations: 1, .. }] => {}
      other => panic!("unexpected events {other:?}"),
    }
  }

  #[tokio::test]
  async fn unknown_concept_is_rejected_before_sending() {
    let h = harness().await;
    synced_with_observation(&h).await;

    let err = queue(&h)
      .submit_encounter(encounter(&h, "not-a-concept"), &CancellationToken::new())
      .await
      .unwrap_err();

    assert!(matches!(err, Error::ConceptNotFound(ref c) if c == "not-a-concept"));
    assert!(h.server.submitted.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn failed_submission_caches_nothing() {
    let h = harness().await;
    synced_with_observation(&h).await;
    h.server.fail("encounters", RemoteError::Timeout);

    let err = queue(&h)
      .submit_encounter(encounter(&h, TEMPERATURE), &CancellationToken::new())
      .await
      .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transport);
    let rows = h.store.observations_for_patient(h.fixture.patient.uuid).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows.iter().all(Observation::is_confirmed));
  }
}

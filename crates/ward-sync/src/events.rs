//! Typed notifications for UI collaborators.
//!
//! Every engine outcome (success or failure) is published on a single
//! broadcast channel. Consumers call [`Notifier::subscribe`] and match on
//! [`Event`]; nothing blocks waiting for them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;
use ward_core::store::{AppendOutcome, PatientRefresh};

use crate::error::{Error, FailureKind};

/// Which sync pass an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
  Full,
  Observations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
  SyncStarted {
    kind: SyncKind,
  },
  FullSyncCompleted {
    finished_at: DateTime<Utc>,
  },
  ObservationSyncCompleted {
    outcome: AppendOutcome,
  },
  SyncFailed {
    kind:    SyncKind,
    failure: FailureKind,
    reason:  String,
  },
  /// The server reported a snapshot older than our watermark. The watermark
  /// was left where it was.
  WatermarkRegressed {
    watermark: DateTime<Utc>,
    reported:  DateTime<Utc>,
  },
  PatientRefreshed {
    patient_uuid: Uuid,
    refresh:      PatientRefresh,
  },
  PatientRefreshFailed {
    patient_uuid: Uuid,
    failure:      FailureKind,
    reason:       String,
  },
  ObservationDeleted {
    uuid: Uuid,
  },
  VoidFailed {
    uuid:    Uuid,
    failure: FailureKind,
    reason:  String,
  },
  EncounterSubmitted {
    patient_uuid:   Uuid,
    encounter_uuid: Uuid,
    observations:   usize,
  },
  EncounterFailed {
    patient_uuid: Uuid,
    failure:      FailureKind,
    reason:       String,
  },
}

impl Event {
  pub(crate) fn sync_failed(kind: SyncKind, err: &Error) -> Self {
    Self::SyncFailed { kind, failure: err.kind(), reason: err.to_string() }
  }

  /// The failure carried by this event, if it reports one.
  pub fn failure(&self) -> Option<FailureKind> {
    match self {
      Self::SyncFailed { failure, .. }
      | Self::PatientRefreshFailed { failure, .. }
      | Self::VoidFailed { failure, .. }
      | Self::EncounterFailed { failure, .. } => Some(*failure),
      _ => None,
    }
  }
}

// ─── Notifier ────────────────────────────────────────────────────────────────

const DEFAULT_CAPACITY: usize = 256;

/// Publishing half of the event channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
  tx: broadcast::Sender<Event>,
}

impl Default for Notifier {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl Notifier {
  /// A notifier buffering up to `capacity` events per lagging subscriber.
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Event> { self.tx.subscribe() }

  pub fn publish(&self, event: Event) {
    tracing::debug!(?event, "publish");
    if self.tx.send(event).is_err() {
      tracing::trace!("no event subscribers");
    }
  }
}

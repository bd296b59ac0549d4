//! The offline sync engine: pulls reference data and observations from the
//! clinical server into a [`ClinicalStore`](ward_core::store::ClinicalStore),
//! pushes local mutations, and assembles per-patient chart views.
//!
//! Components share a [`SessionContext`], a [`WriterLocks`] pair and a
//! [`Notifier`]; construct those once at startup and hand clones to each of
//! [`SyncCoordinator`], [`MutationQueue`] and [`ChartAssembler`].

pub mod assembler;
pub mod coordinator;
mod deadline;
pub mod error;
pub mod events;
pub mod locations;
pub mod locks;
pub mod mutation;
pub mod pending;
pub mod session;
pub mod task;

#[cfg(test)]
mod testing;

pub use assembler::{ChartAssembler, ChartView, EncounterDefaults};
pub use coordinator::{SyncCoordinator, SyncStatus};
pub use error::{Error, FailureKind, Result};
pub use events::{Event, Notifier, SyncKind};
pub use locations::LocationTree;
pub use locks::WriterLocks;
pub use mutation::MutationQueue;
pub use pending::{PendingRequests, RequestId};
pub use session::{ClinicalConcepts, SessionContext, Timeouts};
pub use task::TaskHandle;
pub use tokio_util::sync::CancellationToken;

//! Cancellable background tasks with a single completion callback.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Handle to an engine operation running on the worker pool.
///
/// Cancellation is cooperative: the task observes the token at its own
/// checkpoints. Dropping the handle detaches the task; it keeps running.
#[derive(Debug)]
pub struct TaskHandle<T> {
  join:   JoinHandle<T>,
  cancel: CancellationToken,
}

impl<T: Send + 'static> TaskHandle<T> {
  /// Spawn `task` and run `on_complete` with its output once it finishes.
  ///
  /// `task` receives a clone of `cancel`, the same token
  /// [`TaskHandle::cancel`] trips.
  pub fn spawn<F, Fut, C>(cancel: CancellationToken, task: F, on_complete: C) -> Self
  where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    C: FnOnce(&T) + Send + 'static,
  {
    let fut = task(cancel.clone());
    let join = tokio::spawn(async move {
      let output = fut.await;
      on_complete(&output);
      output
    });
    Self { join, cancel }
  }

  /// Ask the task to stop at its next checkpoint.
  pub fn cancel(&self) { self.cancel.cancel(); }

  pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

  /// A clone of the task's token, for cancelling from elsewhere.
  pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

  pub fn is_finished(&self) -> bool { self.join.is_finished() }

  /// Wait for the task's output.
  pub async fn join(self) -> Result<T> { Ok(self.join.await?) }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;

  #[tokio::test]
  async fn callback_runs_once_with_output() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let handle = TaskHandle::spawn(
      CancellationToken::new(),
      |_| async { 7 },
      move |out: &i32| {
        assert_eq!(*out, 7);
        seen.fetch_add(1, Ordering::SeqCst);
      },
    );
    assert_eq!(handle.join().await.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn cancel_reaches_the_task() {
    let handle = TaskHandle::spawn(
      CancellationToken::new(),
      |token| async move {
        token.cancelled().await;
        "stopped"
      },
      |_| {},
    );
    assert!(!handle.is_finished());
    handle.cancel();
    assert!(handle.is_cancelled());
    assert_eq!(handle.join().await.unwrap(), "stopped");
  }
}

// harvester/src/process/control.rs

//! Cooperative abort and pause flags checked by the record loop between records.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct ProcessControl {
  aborted: AtomicBool,
  paused: AtomicBool,
  wake: Notify,
}

impl ProcessControl {
  pub(crate) fn request_abort(&self) {
    self.aborted.store(true, Ordering::SeqCst);
    self.wake.notify_waiters();
  }

  pub(crate) fn is_abort_requested(&self) -> bool {
    self.aborted.load(Ordering::SeqCst)
  }

  /// Returns `true` if the flag changed.
  pub(crate) fn pause(&self) -> bool {
    !self.paused.swap(true, Ordering::SeqCst)
  }

  /// Returns `true` if the flag changed.
  pub(crate) fn resume(&self) -> bool {
    let changed = self.paused.swap(false, Ordering::SeqCst);
    self.wake.notify_waiters();
    changed
  }

  pub(crate) fn is_paused(&self) -> bool {
    self.paused.load(Ordering::SeqCst)
  }

  /// Record boundary. Waits while paused; returns `false` once an abort has
  /// been requested and `true` when the loop may pull the next record.
  pub(crate) async fn checkpoint(&self) -> bool {
    loop {
      // Registered before the flags are read so a concurrent notify is not lost.
      let notified = self.wake.notified();
      if self.is_abort_requested() {
        return false;
      }
      if !self.is_paused() {
        return true;
      }
      notified.await;
    }
  }

  /// Resolves once an abort has been requested.
  pub(crate) async fn aborted(&self) {
    loop {
      let notified = self.wake.notified();
      if self.is_abort_requested() {
        return;
      }
      notified.await;
    }
  }
}

// harvester/src/process/hooks.rs

//! Listener hooks a caller can attach to a process instance.

use crate::core::control::ProcessStatus;
use crate::error::HarvestError;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Observer of one process instance.
///
/// Callbacks run on the process's worker task (or on the caller's thread for
/// `begin`/`abort`) and must not block.
pub trait ProcessListener: Send + Sync {
  fn status_changed(&self, _process_id: Uuid, _status: ProcessStatus) {}

  /// Called for every record-level failure and for the error that failed the
  /// process, if any.
  fn on_error(&self, _process_id: Uuid, _error: &HarvestError) {}
}

#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<RwLock<Vec<Arc<dyn ProcessListener>>>>);

impl Listeners {
  pub(crate) fn add(&self, listener: Arc<dyn ProcessListener>) {
    self.0.write().push(listener);
  }

  // Listeners are cloned out so none runs under the lock.
  fn snapshot(&self) -> Vec<Arc<dyn ProcessListener>> {
    self.0.read().clone()
  }

  pub(crate) fn notify_status(&self, process_id: Uuid, status: ProcessStatus) {
    for listener in self.snapshot() {
      listener.status_changed(process_id, status);
    }
  }

  pub(crate) fn notify_error(&self, process_id: Uuid, error: &HarvestError) {
    for listener in self.snapshot() {
      listener.on_error(process_id, error);
    }
  }
}

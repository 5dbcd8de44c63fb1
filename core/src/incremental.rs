// harvester/src/incremental.rs

//! Last-seen bookkeeping for incremental harvests.
//!
//! The engine never decides where this state lives. It asks an
//! `IncrementalStore` for the timestamp recorded for a record identity on a
//! previous run and records the new one after a successful publish.

use crate::error::HarvestResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key/value collaborator keyed by `(scope, record id)`.
///
/// `scope` identifies the task (see `TaskDefinition::incremental_scope`).
#[async_trait]
pub trait IncrementalStore: Send + Sync {
  async fn last_modified(&self, scope: &str, record_id: &str) -> HarvestResult<Option<DateTime<Utc>>>;

  async fn record(&self, scope: &str, record_id: &str, modified: DateTime<Utc>) -> HarvestResult<()>;
}

/// Process-local store; state is lost with the engine.
#[derive(Debug, Default)]
pub struct InMemoryIncrementalStore {
  entries: RwLock<HashMap<(String, String), DateTime<Utc>>>,
}

impl InMemoryIncrementalStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }
}

#[async_trait]
impl IncrementalStore for InMemoryIncrementalStore {
  async fn last_modified(&self, scope: &str, record_id: &str) -> HarvestResult<Option<DateTime<Utc>>> {
    let key = (scope.to_string(), record_id.to_string());
    Ok(self.entries.read().get(&key).copied())
  }

  async fn record(&self, scope: &str, record_id: &str, modified: DateTime<Utc>) -> HarvestResult<()> {
    self
      .entries
      .write()
      .insert((scope.to_string(), record_id.to_string()), modified);
    Ok(())
  }
}

// harvester/src/core/statistics.rs

//! Per-process counters.

use crate::core::control::PublishOutcome;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated by one process instance.
///
/// Only the owning process's worker writes; any thread may read through
/// [`Statistics::snapshot`] without blocking the writer.
#[derive(Debug, Default)]
pub struct Statistics {
  harvested: AtomicU64,
  added: AtomicU64,
  updated: AtomicU64,
  deleted: AtomicU64,
  unchanged: AtomicU64,
  skipped: AtomicU64,
  dropped: AtomicU64,
  failed: AtomicU64,
  window: Mutex<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)>,
}

/// Immutable copy of a [`Statistics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
  pub harvested: u64,
  pub added: u64,
  pub updated: u64,
  pub deleted: u64,
  pub unchanged: u64,
  /// Records skipped by the incremental check.
  pub skipped: u64,
  /// Records a transformer filtered out.
  pub dropped: u64,
  pub failed: u64,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl Statistics {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_harvested(&self) {
    self.harvested.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_outcome(&self, outcome: PublishOutcome) {
    let counter = match outcome {
      PublishOutcome::Added => &self.added,
      PublishOutcome::Updated => &self.updated,
      PublishOutcome::Deleted => &self.deleted,
      PublishOutcome::Unchanged => &self.unchanged,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_skipped(&self) {
    self.skipped.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_dropped(&self) {
    self.dropped.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_failed(&self) {
    self.failed.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn mark_started(&self) {
    self.window.lock().0 = Some(Utc::now());
  }

  pub(crate) fn mark_finished(&self) {
    self.window.lock().1 = Some(Utc::now());
  }

  pub fn failed(&self) -> u64 {
    self.failed.load(Ordering::Relaxed)
  }

  pub fn snapshot(&self) -> StatisticsSnapshot {
    let (started_at, finished_at) = *self.window.lock();
    StatisticsSnapshot {
      harvested: self.harvested.load(Ordering::Relaxed),
      added: self.added.load(Ordering::Relaxed),
      updated: self.updated.load(Ordering::Relaxed),
      deleted: self.deleted.load(Ordering::Relaxed),
      unchanged: self.unchanged.load(Ordering::Relaxed),
      skipped: self.skipped.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      started_at,
      finished_at,
    }
  }
}

impl StatisticsSnapshot {
  /// Successful publishes, summed over all destinations.
  pub fn published(&self) -> u64 {
    self.added + self.updated + self.deleted + self.unchanged
  }
}

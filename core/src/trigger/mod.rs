// harvester/src/trigger/mod.rs

//! Scheduling strategies deciding when a task definition gets submitted.
//!
//! A trigger's whole contract is `initiate`: according to its own timing it
//! calls `TriggerContext::submit` zero or more times. One-shot triggers submit
//! inline and return; recurring triggers spawn a timer task and return at once.
//! `close` cancels whatever is still pending.

pub mod cron;
pub mod immediate;
pub mod interval;

pub use self::cron::CronTrigger;
pub use immediate::ImmediateTrigger;
pub use interval::IntervalTrigger;

use crate::core::definition::{TaskDefinition, TriggerInstanceDefinition};
use crate::error::{HarvestError, HarvestResult};
use crate::process::ProcessReference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{event, Level};
use uuid::Uuid;

/// A trigger's only channel back into the engine.
///
/// Must be callable concurrently from several scheduler tasks and must not
/// wait for the submitted process to finish.
#[async_trait]
pub trait TriggerContext: Send + Sync {
  async fn submit(&self, task: Arc<TaskDefinition>) -> HarvestResult<ProcessReference>;
}

#[async_trait]
pub trait Trigger: Send + Sync {
  /// Stable identifier matching `TriggerInstanceDefinition::trigger_type`.
  fn trigger_type(&self) -> &str;

  /// Starts the trigger's schedule for `task`.
  ///
  /// Fails with `InvalidDefinition` when `arguments` don't fit this trigger
  /// type, or with whatever `submit` reported for an inline submission.
  async fn initiate(
    &self,
    context: Arc<dyn TriggerContext>,
    task: Arc<TaskDefinition>,
    arguments: &BTreeMap<String, String>,
  ) -> HarvestResult<()>;

  /// Whether future firings are still pending.
  fn is_active(&self) -> bool {
    false
  }

  /// Cancels pending firings. Idempotent, and fine to call before `initiate`.
  async fn close(&self) -> HarvestResult<()> {
    Ok(())
  }
}

/// Handle to one activated trigger instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReference {
  pub uuid: Uuid,
  pub trigger_instance_definition: TriggerInstanceDefinition,
  pub activated_at: DateTime<Utc>,
}

impl TriggerReference {
  pub(crate) fn new(trigger_instance_definition: TriggerInstanceDefinition) -> Self {
    Self {
      uuid: Uuid::new_v4(),
      trigger_instance_definition,
      activated_at: Utc::now(),
    }
  }
}

/// Owns the timer task of a recurring trigger.
#[derive(Default)]
pub(crate) struct ScheduledTask {
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledTask {
  /// Spawns the timer loop unless one is already running.
  pub(crate) fn start(&self, trigger_type: &str, spawn: impl FnOnce() -> JoinHandle<()>) -> HarvestResult<()> {
    let mut guard = self.handle.lock();
    if guard.as_ref().map_or(false, |h| !h.is_finished()) {
      return Err(HarvestError::illegal_state(format!(
        "{} trigger has already been initiated",
        trigger_type
      )));
    }
    *guard = Some(spawn());
    Ok(())
  }

  pub(crate) fn is_running(&self) -> bool {
    self.handle.lock().as_ref().map_or(false, |h| !h.is_finished())
  }

  pub(crate) fn cancel(&self) {
    if let Some(handle) = self.handle.lock().take() {
      handle.abort();
    }
  }
}

/// Submits `task` on behalf of a recurring trigger. Failures are logged and the
/// schedule carries on.
pub(crate) async fn fire(context: &Arc<dyn TriggerContext>, task: &Arc<TaskDefinition>, trigger_type: &str) {
  match context.submit(Arc::clone(task)).await {
    Ok(reference) => {
      event!(Level::INFO, trigger_type, process_id = %reference.process_id, task = %task.title(), "Trigger submitted task.");
    }
    Err(e) => {
      event!(Level::ERROR, trigger_type, task = %task.title(), error = %e, "Trigger failed to submit task.");
    }
  }
}

/// Reads a mandatory trigger argument.
pub(crate) fn required_argument<'a>(
  arguments: &'a BTreeMap<String, String>,
  key: &str,
  trigger_type: &str,
) -> HarvestResult<&'a str> {
  arguments
    .get(key)
    .map(|v| v.trim())
    .filter(|v| !v.is_empty())
    .ok_or_else(|| HarvestError::invalid_definition(format!("{} trigger requires argument '{}'", trigger_type, key)))
}

// harvester/src/process/instance.rs

//! Defines `ProcessInstance`, one execution of a task definition.
//!
//! ```text
//! SUBMITTED --begin--> WORKING --source exhausted--> COMPLETED
//!     |                   |----abort observed------> ABORTED
//!     |                   `----fatal error---------> FAILED
//!     `--------abort------------------------------> ABORTED
//! ```
//!
//! Pausing keeps the status at `WORKING`; the record loop simply stops pulling
//! until resumed.

use crate::core::control::{PipelineResult, ProcessStatus};
use crate::core::definition::TaskDefinition;
use crate::core::statistics::{Statistics, StatisticsSnapshot};
use crate::error::{HarvestError, HarvestResult};
use crate::incremental::IncrementalStore;
use crate::pipeline::execution::{panic_message, IncrementalScope, RunContext};
use crate::pipeline::Pipeline;
use crate::process::control::ProcessControl;
use crate::process::hooks::{Listeners, ProcessListener};
use crate::registry::ConnectorRegistry;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{event, instrument, Level};
use uuid::Uuid;

/// What a process needs to build its pipeline once it begins.
pub(crate) struct Launch {
  pub(crate) registry: Arc<ConnectorRegistry>,
  pub(crate) incremental_store: Arc<dyn IncrementalStore>,
}

pub struct ProcessInstance {
  id: Uuid,
  title: String,
  task: Arc<TaskDefinition>,
  submitted_at: DateTime<Utc>,
  status: watch::Sender<ProcessStatus>,
  statistics: Arc<Statistics>,
  control: Arc<ProcessControl>,
  listeners: Listeners,
  failure: RwLock<Option<String>>,
  // Present exactly while the process is SUBMITTED.
  launch: Mutex<Option<Launch>>,
}

impl ProcessInstance {
  pub(crate) fn new(task: Arc<TaskDefinition>, launch: Launch) -> Self {
    let (status, _) = watch::channel(ProcessStatus::Submitted);
    Self {
      id: Uuid::new_v4(),
      title: task.title(),
      task,
      submitted_at: Utc::now(),
      status,
      statistics: Arc::new(Statistics::new()),
      control: Arc::new(ProcessControl::default()),
      listeners: Listeners::default(),
      failure: RwLock::new(None),
      launch: Mutex::new(Some(launch)),
    }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn task_definition(&self) -> &Arc<TaskDefinition> {
    &self.task
  }

  pub fn submitted_at(&self) -> DateTime<Utc> {
    self.submitted_at
  }

  pub fn status(&self) -> ProcessStatus {
    *self.status.borrow()
  }

  pub fn statistics(&self) -> StatisticsSnapshot {
    self.statistics.snapshot()
  }

  /// Message of the error that failed the process.
  pub fn failure(&self) -> Option<String> {
    self.failure.read().clone()
  }

  pub fn is_paused(&self) -> bool {
    self.control.is_paused()
  }

  pub fn add_listener(&self, listener: Arc<dyn ProcessListener>) {
    self.listeners.add(listener);
  }

  pub fn report(&self) -> ProcessStatistics {
    ProcessStatistics {
      uuid: self.id,
      title: self.title.clone(),
      task_definition: (*self.task).clone(),
      status: self.status(),
      statistics: self.statistics(),
      failure: self.failure(),
    }
  }

  /// Starts the process on the current tokio runtime.
  ///
  /// Only valid from `SUBMITTED`; anything else fails with `IllegalState` and
  /// changes nothing.
  pub fn begin(self: &Arc<Self>) -> HarvestResult<()> {
    let runtime = Handle::try_current()
      .map_err(|_| HarvestError::illegal_state("a process can only begin inside a tokio runtime"))?;

    let launch = {
      let mut slot = self.launch.lock();
      self
        .transition(&[ProcessStatus::Submitted], ProcessStatus::Working)
        .map_err(|current| {
          HarvestError::illegal_state(format!("cannot begin process {} while {}", self.id, current))
        })?;
      slot
        .take()
        .ok_or_else(|| HarvestError::Internal(format!("process {} lost its launch parameters", self.id)))?
    };

    self.statistics.mark_started();
    self.listeners.notify_status(self.id, ProcessStatus::Working);
    event!(Level::INFO, process_id = %self.id, title = %self.title, "Process started.");

    let this = Arc::clone(self);
    runtime.spawn(async move { this.execute(launch).await });
    Ok(())
  }

  /// Requests cancellation.
  ///
  /// A submitted process is aborted on the spot. A working one is flagged and
  /// reaches `ABORTED` once the record loop observes the flag at the next
  /// record boundary and has released its stages. Terminal processes reject
  /// the request.
  pub fn abort(&self) -> HarvestResult<()> {
    {
      let mut slot = self.launch.lock();
      if self
        .transition(&[ProcessStatus::Submitted], ProcessStatus::Aborted)
        .is_ok()
      {
        slot.take();
        self.statistics.mark_finished();
        self.listeners.notify_status(self.id, ProcessStatus::Aborted);
        event!(Level::INFO, process_id = %self.id, "Process aborted before it began.");
        return Ok(());
      }
    }

    match self.status() {
      ProcessStatus::Working => {
        event!(Level::INFO, process_id = %self.id, "Abort requested.");
        self.control.request_abort();
        Ok(())
      }
      other => Err(HarvestError::illegal_state(format!(
        "cannot abort process {} while {}",
        self.id, other
      ))),
    }
  }

  /// Suspends record pulling. Resources stay acquired.
  pub fn pause(&self) -> HarvestResult<()> {
    self.require_working("pause")?;
    if self.control.pause() {
      event!(Level::INFO, process_id = %self.id, "Process paused.");
    }
    Ok(())
  }

  pub fn resume(&self) -> HarvestResult<()> {
    self.require_working("resume")?;
    if self.control.resume() {
      event!(Level::INFO, process_id = %self.id, "Process resumed.");
    }
    Ok(())
  }

  /// Waits until the process reaches a terminal status and returns it.
  ///
  /// Never returns for a process that is not begun or aborted.
  pub async fn wait(&self) -> ProcessStatus {
    let mut receiver = self.status.subscribe();
    let status = match receiver.wait_for(|status| status.is_terminal()).await {
      Ok(status) => *status,
      Err(_) => self.status(),
    };
    status
  }

  fn require_working(&self, operation: &str) -> HarvestResult<()> {
    match self.status() {
      ProcessStatus::Working => Ok(()),
      other => Err(HarvestError::illegal_state(format!(
        "cannot {} process {} while {}",
        operation, self.id, other
      ))),
    }
  }

  /// Atomically moves to `to` if the current status is one of `from`.
  /// Returns the previous status, or the current one when refused.
  fn transition(&self, from: &[ProcessStatus], to: ProcessStatus) -> Result<ProcessStatus, ProcessStatus> {
    let mut outcome = Err(ProcessStatus::Submitted);
    self.status.send_if_modified(|current| {
      if from.contains(current) {
        outcome = Ok(*current);
        *current = to;
        true
      } else {
        outcome = Err(*current);
        false
      }
    });
    outcome
  }

  #[instrument(
        name = "ProcessInstance::execute",
        skip_all,
        fields(process_id = %self.id, title = %self.title)
    )]
  async fn execute(self: Arc<Self>, launch: Launch) {
    let ctx = RunContext {
      process_id: self.id,
      statistics: Arc::clone(&self.statistics),
      control: Arc::clone(&self.control),
      listeners: self.listeners.clone(),
      incremental: self.task.incremental.then(|| IncrementalScope {
        store: Arc::clone(&launch.incremental_store),
        scope: self.task.incremental_scope(),
      }),
    };

    let built = AssertUnwindSafe(Pipeline::build(&launch.registry, &self.task))
      .catch_unwind()
      .await
      .unwrap_or_else(|panic| {
        Err(HarvestError::Internal(format!(
          "pipeline setup panicked: {}",
          panic_message(panic.as_ref())
        )))
      });

    let outcome = match built {
      Ok(pipeline) => pipeline.run(&ctx).await,
      Err(e) => Err(e),
    };

    let final_status = match outcome {
      Ok(PipelineResult::Completed) => ProcessStatus::Completed,
      Ok(PipelineResult::Aborted) => ProcessStatus::Aborted,
      Err(e) => {
        event!(Level::ERROR, error = %e, "Process failed.");
        *self.failure.write() = Some(e.to_string());
        self.listeners.notify_error(self.id, &e);
        ProcessStatus::Failed
      }
    };
    self.finish(final_status);
  }

  fn finish(&self, status: ProcessStatus) {
    self.statistics.mark_finished();
    if self.transition(&[ProcessStatus::Working], status).is_ok() {
      let stats = self.statistics.snapshot();
      event!(
        Level::INFO,
        process_id = %self.id,
        %status,
        harvested = stats.harvested,
        added = stats.added,
        updated = stats.updated,
        deleted = stats.deleted,
        failed = stats.failed,
        "Process finished."
      );
      self.listeners.notify_status(self.id, status);
    }
  }
}

impl fmt::Debug for ProcessInstance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProcessInstance")
      .field("id", &self.id)
      .field("title", &self.title)
      .field("status", &self.status())
      .finish()
  }
}

/// Handle returned by submission. The instance is shared with the engine's
/// registry, which only reads it.
#[derive(Debug, Clone)]
pub struct ProcessReference {
  pub process_id: Uuid,
  pub process: Arc<ProcessInstance>,
}

impl ProcessReference {
  pub(crate) fn new(process: Arc<ProcessInstance>) -> Self {
    Self {
      process_id: process.id(),
      process,
    }
  }
}

/// Serializable view of a process, as returned by status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatistics {
  pub uuid: Uuid,
  pub title: String,
  pub task_definition: TaskDefinition,
  pub status: ProcessStatus,
  pub statistics: StatisticsSnapshot,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<String>,
}

impl fmt::Display for ProcessStatistics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "PROCESS/STATISTICS :: id: {}, task: {}, status: {}, statistics: {:?}",
      self.uuid, self.task_definition, self.status, self.statistics
    )
  }
}

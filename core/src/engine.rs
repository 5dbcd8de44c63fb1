// harvester/src/engine.rs

//! Defines `Engine`, the process-wide coordinator: task definition CRUD
//! delegation, the registry of activated triggers, the registry of process
//! instances, and engine start/shutdown.
//!
//! `Engine` is a cheap handle; clones share the same registries.

use crate::config::EngineConfig;
use crate::core::definition::{EntityDefinition, TaskDefinition, TriggerInstanceDefinition};
use crate::error::{HarvestError, HarvestResult};
use crate::incremental::{InMemoryIncrementalStore, IncrementalStore};
use crate::process::instance::Launch;
use crate::process::{ProcessInstance, ProcessReference, ProcessStatistics};
use crate::registry::ConnectorRegistry;
use crate::task_store::{InMemoryTaskStore, TaskStore};
use crate::trigger::{Trigger, TriggerContext, TriggerReference};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{event, instrument, Level};
use uuid::Uuid;

struct ActiveTrigger {
  reference: TriggerReference,
  trigger: Arc<dyn Trigger>,
}

struct EngineInner {
  config: EngineConfig,
  registry: Arc<ConnectorRegistry>,
  task_store: Arc<dyn TaskStore>,
  incremental_store: Arc<dyn IncrementalStore>,
  processes: RwLock<HashMap<Uuid, Arc<ProcessInstance>>>,
  triggers: RwLock<HashMap<Uuid, ActiveTrigger>>,
  housekeeping: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Engine {
  inner: Arc<EngineInner>,
}

impl Engine {
  pub fn new(
    config: EngineConfig,
    registry: Arc<ConnectorRegistry>,
    task_store: Arc<dyn TaskStore>,
    incremental_store: Arc<dyn IncrementalStore>,
  ) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        config,
        registry,
        task_store,
        incremental_store,
        processes: RwLock::new(HashMap::new()),
        triggers: RwLock::new(HashMap::new()),
        housekeeping: Mutex::new(None),
      }),
    }
  }

  /// Engine backed by in-memory task and incremental stores.
  pub fn in_memory(config: EngineConfig, registry: Arc<ConnectorRegistry>) -> Self {
    Self::new(
      config,
      registry,
      Arc::new(InMemoryTaskStore::new()),
      Arc::new(InMemoryIncrementalStore::new()),
    )
  }

  pub fn config(&self) -> &EngineConfig {
    &self.inner.config
  }

  pub fn registry(&self) -> &Arc<ConnectorRegistry> {
    &self.inner.registry
  }

  // --- Task definitions ---

  pub async fn add_task_definition(&self, task: TaskDefinition) -> HarvestResult<Uuid> {
    let id = self.inner.task_store.create(task).await?;
    event!(Level::DEBUG, task_id = %id, "Task definition added.");
    Ok(id)
  }

  pub async fn read_task_definition(&self, task_id: Uuid) -> HarvestResult<Option<TaskDefinition>> {
    self.inner.task_store.read(task_id).await
  }

  /// Replaces a stored definition and returns the previous one.
  pub async fn update_task_definition(
    &self,
    task_id: Uuid,
    task: TaskDefinition,
  ) -> HarvestResult<Option<TaskDefinition>> {
    self.inner.task_store.update(task_id, task).await
  }

  pub async fn delete_task_definition(&self, task_id: Uuid) -> HarvestResult<bool> {
    self.inner.task_store.delete(task_id).await
  }

  pub async fn select_task_definitions(
    &self,
    predicate: impl Fn(&TaskDefinition) -> bool,
  ) -> HarvestResult<Vec<(Uuid, TaskDefinition)>> {
    let tasks = self.inner.task_store.list().await?;
    Ok(tasks.into_iter().filter(|(_, task)| predicate(task)).collect())
  }

  /// Reads a stored task, submits it and begins the process.
  pub async fn execute_task(&self, task_id: Uuid) -> HarvestResult<ProcessReference> {
    let task = self.require_task(task_id).await?;
    let reference = self.submit_task_definition(task)?;
    reference.process.begin()?;
    Ok(reference)
  }

  /// Schedules a stored task with the trigger described by `trigger`.
  pub async fn schedule_stored_task(
    &self,
    task_id: Uuid,
    trigger: &EntityDefinition,
  ) -> HarvestResult<TriggerReference> {
    let task = self.require_task(task_id).await?;
    self
      .schedule_task(TriggerInstanceDefinition::from_entity(trigger, task))
      .await
  }

  async fn require_task(&self, task_id: Uuid) -> HarvestResult<TaskDefinition> {
    self
      .inner
      .task_store
      .read(task_id)
      .await?
      .ok_or_else(|| HarvestError::invalid_definition(format!("no task definition with id {}", task_id)))
  }

  // --- Processes ---

  /// Creates a `SUBMITTED` process for `task` and registers it.
  ///
  /// Unknown source, link or processor types are rejected here. Connectors are
  /// only instantiated once the process begins.
  #[instrument(name = "Engine::submit_task_definition", skip_all, err(Display))]
  pub fn submit_task_definition(&self, task: impl Into<Arc<TaskDefinition>>) -> HarvestResult<ProcessReference> {
    let task = task.into();
    self.inner.registry.validate_task(&task)?;

    let process = Arc::new(ProcessInstance::new(
      task,
      Launch {
        registry: Arc::clone(&self.inner.registry),
        incremental_store: Arc::clone(&self.inner.incremental_store),
      },
    ));
    self
      .inner
      .processes
      .write()
      .insert(process.id(), Arc::clone(&process));
    event!(Level::INFO, process_id = %process.id(), title = %process.title(), "Task submitted.");
    Ok(ProcessReference::new(process))
  }

  pub fn get_process(&self, process_id: Uuid) -> Option<ProcessReference> {
    self
      .inner
      .processes
      .read()
      .get(&process_id)
      .cloned()
      .map(ProcessReference::new)
  }

  /// All registered processes, oldest submission first.
  pub fn list_processes(&self) -> Vec<ProcessReference> {
    let mut processes: Vec<Arc<ProcessInstance>> = self.inner.processes.read().values().cloned().collect();
    processes.sort_by_key(|p| p.submitted_at());
    processes.into_iter().map(ProcessReference::new).collect()
  }

  pub fn process_statistics(&self, process_id: Uuid) -> Option<ProcessStatistics> {
    self.inner.processes.read().get(&process_id).map(|p| p.report())
  }

  /// Evicts a finished process from the registry.
  pub fn remove_process(&self, process_id: Uuid) -> HarvestResult<Option<ProcessReference>> {
    let mut processes = self.inner.processes.write();
    match processes.get(&process_id) {
      None => Ok(None),
      Some(process) if !process.status().is_terminal() => Err(HarvestError::illegal_state(format!(
        "process {} is still {}",
        process_id,
        process.status()
      ))),
      Some(_) => Ok(processes.remove(&process_id).map(ProcessReference::new)),
    }
  }

  /// Evicts processes that finished more than `older_than` ago. Returns how many.
  pub fn purge_finished(&self, older_than: Duration) -> usize {
    let Some(cutoff) = chrono::Duration::from_std(older_than)
      .ok()
      .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
      return 0;
    };
    let mut processes = self.inner.processes.write();
    let before = processes.len();
    processes.retain(|_, process| {
      if !process.status().is_terminal() {
        return true;
      }
      match process.statistics().finished_at {
        Some(finished_at) => finished_at > cutoff,
        None => true,
      }
    });
    let purged = before - processes.len();
    if purged > 0 {
      event!(Level::DEBUG, purged, "Evicted finished processes.");
    }
    purged
  }

  // --- Triggers ---

  /// Activates a trigger for the task carried by `definition`.
  ///
  /// One-shot triggers have done all their work by the time this returns and
  /// are not kept in the activated list; recurring ones stay until
  /// deactivated.
  #[instrument(
        name = "Engine::schedule_task",
        skip_all,
        fields(trigger_type = %definition.trigger_type),
        err(Display)
    )]
  pub async fn schedule_task(&self, definition: TriggerInstanceDefinition) -> HarvestResult<TriggerReference> {
    self.inner.registry.validate_task(&definition.task_definition)?;
    let trigger: Arc<dyn Trigger> = Arc::from(self.inner.registry.create_trigger(&definition.trigger_type)?);

    let task = Arc::new(definition.task_definition.clone());
    let properties = definition.properties.clone();
    let reference = TriggerReference::new(definition);

    if let Err(e) = trigger.initiate(self.trigger_context(), task, &properties).await {
      if let Err(close_err) = trigger.close().await {
        event!(Level::WARN, error = %close_err, "Failed to close trigger after failed initiation.");
      }
      return Err(e);
    }

    if trigger.is_active() {
      self.inner.triggers.write().insert(
        reference.uuid,
        ActiveTrigger {
          reference: reference.clone(),
          trigger,
        },
      );
      event!(Level::INFO, trigger_id = %reference.uuid, "Trigger activated.");
    } else {
      event!(Level::DEBUG, trigger_id = %reference.uuid, "Trigger schedule already exhausted.");
    }
    Ok(reference)
  }

  /// Cancels an activated trigger and returns its reference.
  #[instrument(name = "Engine::deactivate_trigger_instance", skip(self), err(Display))]
  pub async fn deactivate_trigger_instance(&self, trigger_id: Uuid) -> HarvestResult<TriggerReference> {
    let active = self
      .inner
      .triggers
      .write()
      .remove(&trigger_id)
      .ok_or_else(|| HarvestError::invalid_definition(format!("no activated trigger with id {}", trigger_id)))?;

    active
      .trigger
      .close()
      .await
      .map_err(|e| HarvestError::processor(format!("failed to close trigger {}: {}", trigger_id, e)))?;
    event!(Level::INFO, %trigger_id, "Trigger deactivated.");
    Ok(active.reference)
  }

  /// Activated triggers with pending firings, oldest first.
  pub fn list_activated_triggers(&self) -> Vec<TriggerReference> {
    let mut triggers = self.inner.triggers.write();
    triggers.retain(|_, active| active.trigger.is_active());
    let mut references: Vec<TriggerReference> = triggers.values().map(|a| a.reference.clone()).collect();
    references.sort_by_key(|r| r.activated_at);
    references
  }

  /// The context handed to triggers: each submission is begun right away.
  pub fn trigger_context(&self) -> Arc<dyn TriggerContext> {
    Arc::new(EngineTriggerContext {
      engine: Arc::downgrade(&self.inner),
    })
  }

  // --- Lifecycle ---

  /// Starts background housekeeping when a process TTL is configured.
  pub fn start(&self) -> HarvestResult<()> {
    self.inner.config.validate()?;
    let Some(ttl) = self.inner.config.process_ttl() else {
      return Ok(());
    };
    let runtime =
      Handle::try_current().map_err(|_| HarvestError::illegal_state("the engine can only start inside a tokio runtime"))?;

    let mut slot = self.inner.housekeeping.lock();
    if slot.is_some() {
      return Err(HarvestError::illegal_state("engine already started"));
    }
    let weak = Arc::downgrade(&self.inner);
    let period = self.inner.config.housekeeping_interval();
    *slot = Some(runtime.spawn(async move {
      let mut ticker = tokio::time::interval(period);
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else { break };
        Engine { inner }.purge_finished(ttl);
      }
    }));
    event!(Level::INFO, ?ttl, ?period, "Engine housekeeping started.");
    Ok(())
  }

  /// Closes every trigger, aborts unfinished processes, waits up to the
  /// configured grace period for them, then clears the registries.
  #[instrument(name = "Engine::shutdown", skip_all)]
  pub async fn shutdown(&self) {
    if let Some(handle) = self.inner.housekeeping.lock().take() {
      handle.abort();
    }

    let triggers: Vec<ActiveTrigger> = self.inner.triggers.write().drain().map(|(_, t)| t).collect();
    for active in triggers {
      if let Err(e) = active.trigger.close().await {
        event!(Level::WARN, trigger_id = %active.reference.uuid, error = %e, "Failed to close trigger.");
      }
    }

    let unfinished: Vec<Arc<ProcessInstance>> = self
      .inner
      .processes
      .read()
      .values()
      .filter(|p| !p.status().is_terminal())
      .cloned()
      .collect();
    for process in &unfinished {
      if let Err(e) = process.abort() {
        event!(Level::DEBUG, process_id = %process.id(), error = %e, "Abort during shutdown skipped.");
      }
    }
    let drained = tokio::time::timeout(self.inner.config.shutdown_grace(), async {
      for process in &unfinished {
        process.wait().await;
      }
    })
    .await;
    if drained.is_err() {
      event!(Level::WARN, "Shutdown grace period elapsed with processes still running.");
    }

    self.inner.processes.write().clear();
    event!(Level::INFO, "Engine shut down.");
  }
}

struct EngineTriggerContext {
  engine: Weak<EngineInner>,
}

#[async_trait]
impl TriggerContext for EngineTriggerContext {
  async fn submit(&self, task: Arc<TaskDefinition>) -> HarvestResult<ProcessReference> {
    let inner = self
      .engine
      .upgrade()
      .ok_or_else(|| HarvestError::illegal_state("engine has shut down"))?;
    let reference = Engine { inner }.submit_task_definition(task)?;
    reference.process.begin()?;
    Ok(reference)
  }
}

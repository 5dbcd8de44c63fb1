// harvester/src/task_store.rs

//! Storage boundary for task definitions. The engine delegates CRUD here and
//! holds no definitions of its own.

use crate::core::definition::TaskDefinition;
use crate::error::HarvestResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait TaskStore: Send + Sync {
  /// Stores a new definition and returns the identifier assigned to it.
  async fn create(&self, task: TaskDefinition) -> HarvestResult<Uuid>;

  async fn read(&self, id: Uuid) -> HarvestResult<Option<TaskDefinition>>;

  /// Replaces a definition, returning the previous one (`None` if unknown).
  async fn update(&self, id: Uuid, task: TaskDefinition) -> HarvestResult<Option<TaskDefinition>>;

  /// Returns `true` when something was deleted.
  async fn delete(&self, id: Uuid) -> HarvestResult<bool>;

  async fn list(&self) -> HarvestResult<Vec<(Uuid, TaskDefinition)>>;
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
  tasks: RwLock<HashMap<Uuid, TaskDefinition>>,
}

impl InMemoryTaskStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
  async fn create(&self, mut task: TaskDefinition) -> HarvestResult<Uuid> {
    let id = Uuid::new_v4();
    task.reference = Some(id.to_string());
    self.tasks.write().insert(id, task);
    Ok(id)
  }

  async fn read(&self, id: Uuid) -> HarvestResult<Option<TaskDefinition>> {
    Ok(self.tasks.read().get(&id).cloned())
  }

  async fn update(&self, id: Uuid, mut task: TaskDefinition) -> HarvestResult<Option<TaskDefinition>> {
    let mut tasks = self.tasks.write();
    if !tasks.contains_key(&id) {
      return Ok(None);
    }
    task.reference = Some(id.to_string());
    Ok(tasks.insert(id, task))
  }

  async fn delete(&self, id: Uuid) -> HarvestResult<bool> {
    Ok(self.tasks.write().remove(&id).is_some())
  }

  async fn list(&self) -> HarvestResult<Vec<(Uuid, TaskDefinition)>> {
    let mut tasks: Vec<(Uuid, TaskDefinition)> = self
      .tasks
      .read()
      .iter()
      .map(|(id, task)| (*id, task.clone()))
      .collect();
    tasks.sort_by(|a, b| a.1.name.cmp(&b.1.name).then(a.0.cmp(&b.0)));
    Ok(tasks)
  }
}

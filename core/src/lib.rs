// src/lib.rs

//! Harvester: an ASYNC task, trigger and process orchestration engine for
//! metadata harvesting pipelines.
//!
//! A harvest is described declaratively by a `TaskDefinition`: one source,
//! an ordered list of transformer and destination links, and an optional
//! processor override. Harvester provides:
//!  - Task definition storage (create, read, update, delete, select).
//!  - Triggers deciding when a task is submitted (`IMMEDIATE`, `INTERVAL`, `CRON`).
//!  - Process instances with a guarded lifecycle (submit, begin, pause, abort).
//!  - A record loop pulling from the source through every link, with
//!    per-record failure isolation and guaranteed release of all stages.
//!  - Incremental harvesting and live per-process statistics.
//!  - A type-keyed registry mapping definition `type` strings to connectors.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod incremental;
pub mod pipeline;
pub mod process;
pub mod registry;
pub mod task_store;
pub mod trigger;

// --- Re-exports for the Public API ---

pub use crate::core::control::{PipelineResult, ProcessStatus, PublishOutcome};
pub use crate::core::data_reference::DataReference;
pub use crate::core::definition::{
  EntityDefinition, LinkDefinition, LinkKind, TaskDefinition, TriggerInstanceDefinition,
};
pub use crate::core::link::{Destination, LinkProcessor, Transformer};
pub use crate::core::source::{ChannelSource, IterSource, RecordSender, Source};
pub use crate::core::statistics::StatisticsSnapshot;

pub use crate::pipeline::{Pipeline, PipelineOptions};
pub use crate::process::{ProcessInstance, ProcessListener, ProcessReference, ProcessStatistics};
pub use crate::trigger::{Trigger, TriggerContext, TriggerReference};

pub use crate::config::EngineConfig;
pub use crate::engine::Engine;
pub use crate::error::{HarvestError, HarvestResult};
pub use crate::incremental::{InMemoryIncrementalStore, IncrementalStore};
pub use crate::registry::ConnectorRegistry;
pub use crate::task_store::{InMemoryTaskStore, TaskStore};

/*
    Core Workflow:
    1. Register connector factories on a `ConnectorRegistry` under their type names.
    2. Build an `Engine` with an `EngineConfig` and the registry.
    3. Describe a harvest with a `TaskDefinition` (source + links).
    4. Either submit it directly (`submit_task_definition` + `begin`) or schedule it
       with a `TriggerInstanceDefinition` through `schedule_task`.
    5. Observe processes through `ProcessReference`, `wait()` and `report()`.
    6. Call `engine.shutdown().await` to cancel triggers and abort running processes.
*/

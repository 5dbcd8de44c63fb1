// harvester/src/registry.rs

//! Defines `ConnectorRegistry`, a type-name keyed registry of factories for
//! every pluggable component an `EntityDefinition` can describe: sources,
//! transformers, destinations, triggers and processors.
//!
//! Definitions select their implementation at runtime through their `type`
//! string; the registry turns that string into a concrete trait object.

use crate::core::definition::{EntityDefinition, LinkDefinition, LinkKind, TaskDefinition};
use crate::core::link::{Destination, DestinationProcessor, LinkProcessor, Transformer, TransformerProcessor};
use crate::core::source::Source;
use crate::error::{HarvestError, HarvestResult};
use crate::pipeline::PipelineOptions;
use crate::trigger::{CronTrigger, ImmediateTrigger, IntervalTrigger, Trigger};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

pub type SourceFactory =
  Arc<dyn Fn(&EntityDefinition, &TaskDefinition) -> HarvestResult<Box<dyn Source>> + Send + Sync>;
pub type TransformerFactory = Arc<dyn Fn(&EntityDefinition) -> HarvestResult<Box<dyn Transformer>> + Send + Sync>;
pub type DestinationFactory = Arc<dyn Fn(&EntityDefinition) -> HarvestResult<Box<dyn Destination>> + Send + Sync>;
pub type TriggerFactory = Arc<dyn Fn() -> Box<dyn Trigger> + Send + Sync>;
pub type ProcessorFactory = Arc<dyn Fn(&EntityDefinition) -> HarvestResult<PipelineOptions> + Send + Sync>;

/// Processor used when a task definition does not name one.
pub const DEFAULT_PROCESSOR: &str = "DEFAULT";

pub struct ConnectorRegistry {
  sources: RwLock<HashMap<String, SourceFactory>>,
  transformers: RwLock<HashMap<String, TransformerFactory>>,
  destinations: RwLock<HashMap<String, DestinationFactory>>,
  triggers: RwLock<HashMap<String, TriggerFactory>>,
  processors: RwLock<HashMap<String, ProcessorFactory>>,
}

impl ConnectorRegistry {
  /// Creates a registry holding the built-in triggers (`IMMEDIATE`,
  /// `INTERVAL`, `CRON`) and the `DEFAULT` processor. Connectors are added
  /// by the embedding application.
  pub fn new() -> Self {
    let registry = Self {
      sources: RwLock::new(HashMap::new()),
      transformers: RwLock::new(HashMap::new()),
      destinations: RwLock::new(HashMap::new()),
      triggers: RwLock::new(HashMap::new()),
      processors: RwLock::new(HashMap::new()),
    };
    registry.register_trigger(ImmediateTrigger::TYPE, || Box::new(ImmediateTrigger::new()));
    registry.register_trigger(IntervalTrigger::TYPE, || Box::new(IntervalTrigger::new()));
    registry.register_trigger(CronTrigger::TYPE, || Box::new(CronTrigger::new()));
    registry.register_processor(DEFAULT_PROCESSOR, PipelineOptions::from_definition);
    registry
  }

  pub fn register_source(
    &self,
    source_type: impl Into<String>,
    factory: impl Fn(&EntityDefinition, &TaskDefinition) -> HarvestResult<Box<dyn Source>> + Send + Sync + 'static,
  ) {
    let source_type = source_type.into();
    event!(Level::DEBUG, %source_type, "Registering source.");
    self.sources.write().insert(source_type, Arc::new(factory));
  }

  pub fn register_transformer(
    &self,
    transformer_type: impl Into<String>,
    factory: impl Fn(&EntityDefinition) -> HarvestResult<Box<dyn Transformer>> + Send + Sync + 'static,
  ) {
    let transformer_type = transformer_type.into();
    event!(Level::DEBUG, %transformer_type, "Registering transformer.");
    self.transformers.write().insert(transformer_type, Arc::new(factory));
  }

  pub fn register_destination(
    &self,
    destination_type: impl Into<String>,
    factory: impl Fn(&EntityDefinition) -> HarvestResult<Box<dyn Destination>> + Send + Sync + 'static,
  ) {
    let destination_type = destination_type.into();
    event!(Level::DEBUG, %destination_type, "Registering destination.");
    self.destinations.write().insert(destination_type, Arc::new(factory));
  }

  pub fn register_trigger(
    &self,
    trigger_type: impl Into<String>,
    factory: impl Fn() -> Box<dyn Trigger> + Send + Sync + 'static,
  ) {
    let trigger_type = trigger_type.into();
    event!(Level::DEBUG, %trigger_type, "Registering trigger.");
    self.triggers.write().insert(trigger_type, Arc::new(factory));
  }

  pub fn register_processor(
    &self,
    processor_type: impl Into<String>,
    factory: impl Fn(&EntityDefinition) -> HarvestResult<PipelineOptions> + Send + Sync + 'static,
  ) {
    let processor_type = processor_type.into();
    event!(Level::DEBUG, %processor_type, "Registering processor.");
    self.processors.write().insert(processor_type, Arc::new(factory));
  }

  pub fn create_source(&self, definition: &EntityDefinition, task: &TaskDefinition) -> HarvestResult<Box<dyn Source>> {
    let factory = lookup(&self.sources, "source", definition.entity_type())?;
    factory(definition, task)
  }

  /// Instantiates a transformer or destination and wraps it as a link.
  pub fn create_link(&self, link: &LinkDefinition) -> HarvestResult<Box<dyn LinkProcessor>> {
    let entity_type = link.action.entity_type();
    match link.kind {
      LinkKind::Transformer => {
        let factory = lookup(&self.transformers, "transformer", entity_type)?;
        let transformer = factory(&link.action)?;
        Ok(Box::new(TransformerProcessor::new(link.clone(), transformer)))
      }
      LinkKind::Destination => {
        let factory = lookup(&self.destinations, "destination", entity_type)?;
        let destination = factory(&link.action)?;
        Ok(Box::new(DestinationProcessor::new(link.clone(), destination)))
      }
    }
  }

  pub fn create_trigger(&self, trigger_type: &str) -> HarvestResult<Box<dyn Trigger>> {
    let factory = lookup(&self.triggers, "trigger", trigger_type)?;
    Ok(factory())
  }

  /// Resolves the processor override of a task into pipeline options.
  pub fn pipeline_options(&self, processor: Option<&EntityDefinition>) -> HarvestResult<PipelineOptions> {
    match processor {
      None => Ok(PipelineOptions::default()),
      Some(definition) => {
        let factory = lookup(&self.processors, "processor", definition.entity_type())?;
        factory(definition)
      }
    }
  }

  /// Checks that every type named by `task` is registered, without
  /// instantiating anything.
  pub fn validate_task(&self, task: &TaskDefinition) -> HarvestResult<()> {
    if let Some(processor) = &task.processor {
      lookup(&self.processors, "processor", processor.entity_type())?;
    }
    lookup(&self.sources, "source", task.source.entity_type())?;
    for link in &task.destinations {
      match link.kind {
        LinkKind::Transformer => lookup(&self.transformers, "transformer", link.action.entity_type()).map(drop)?,
        LinkKind::Destination => lookup(&self.destinations, "destination", link.action.entity_type()).map(drop)?,
      }
    }
    Ok(())
  }

  pub fn source_types(&self) -> Vec<String> {
    sorted_keys(&self.sources)
  }

  pub fn transformer_types(&self) -> Vec<String> {
    sorted_keys(&self.transformers)
  }

  pub fn destination_types(&self) -> Vec<String> {
    sorted_keys(&self.destinations)
  }

  pub fn trigger_types(&self) -> Vec<String> {
    sorted_keys(&self.triggers)
  }

  pub fn processor_types(&self) -> Vec<String> {
    sorted_keys(&self.processors)
  }
}

impl Default for ConnectorRegistry {
  fn default() -> Self {
    Self::new()
  }
}

// The factory is cloned out so the lock is not held while it runs.
fn lookup<F: Clone>(map: &RwLock<HashMap<String, F>>, kind: &str, entity_type: &str) -> HarvestResult<F> {
  map.read().get(entity_type).cloned().ok_or_else(|| {
    event!(Level::WARN, kind, entity_type, "No factory registered.");
    HarvestError::invalid_definition(format!("unknown {} type '{}'", kind, entity_type))
  })
}

fn sorted_keys<F>(map: &RwLock<HashMap<String, F>>) -> Vec<String> {
  let mut keys: Vec<String> = map.read().keys().cloned().collect();
  keys.sort();
  keys
}

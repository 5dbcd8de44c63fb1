// harvester/src/pipeline/definition.rs

//! Contains the `Pipeline` struct and its construction from a `TaskDefinition`.

use crate::core::definition::{EntityDefinition, LinkKind, TaskDefinition};
use crate::core::link::LinkProcessor;
use crate::core::source::Source;
use crate::error::{HarvestError, HarvestResult};
use crate::registry::ConnectorRegistry;
use tracing::{event, Level};

/// Settings a processor definition contributes to the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
  /// Fail the whole process once more than this many records failed.
  pub max_failures: Option<u64>,
}

impl PipelineOptions {
  /// Reads the `maxFailures` property of a processor definition.
  pub fn from_definition(definition: &EntityDefinition) -> HarvestResult<Self> {
    let max_failures = match definition.property("maxFailures") {
      Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
        HarvestError::invalid_definition(format!(
          "processor '{}': maxFailures must be a non-negative integer, got '{}'",
          definition.entity_type(),
          value
        ))
      })?),
      None => None,
    };
    Ok(Self { max_failures })
  }
}

/// A fully instantiated pipeline.
///
/// Stages are kept in acquisition order; the transformer chain and the
/// destination fan-out are the transformer and destination links of that list
/// respectively, each in definition order.
pub struct Pipeline {
  pub(crate) source: Box<dyn Source>,
  pub(crate) stages: Vec<Box<dyn LinkProcessor>>,
  pub(crate) options: PipelineOptions,
}

impl Pipeline {
  pub fn new(source: Box<dyn Source>) -> Self {
    Self {
      source,
      stages: Vec::new(),
      options: PipelineOptions::default(),
    }
  }

  pub fn with_options(mut self, options: PipelineOptions) -> Self {
    self.options = options;
    self
  }

  pub fn add_stage(&mut self, stage: Box<dyn LinkProcessor>) {
    self.stages.push(stage);
  }

  pub fn stage_count(&self) -> usize {
    self.stages.len()
  }

  /// Instantiates the source and every link named by `task`.
  ///
  /// If any factory fails, everything acquired so far is released before the
  /// error is returned.
  pub async fn build(registry: &ConnectorRegistry, task: &TaskDefinition) -> HarvestResult<Self> {
    let options = registry.pipeline_options(task.processor.as_ref())?;
    let source = registry.create_source(&task.source, task)?;
    let mut pipeline = Pipeline::new(source).with_options(options);

    for link in &task.destinations {
      match registry.create_link(link) {
        Ok(stage) => pipeline.add_stage(stage),
        Err(e) => {
          event!(Level::ERROR, link = %link, error = %e, "Failed to instantiate link; releasing acquired stages.");
          pipeline.release().await;
          return Err(e);
        }
      }
    }
    event!(Level::DEBUG, stages = pipeline.stage_count(), "Pipeline built.");
    Ok(pipeline)
  }

  /// Closes every stage in reverse acquisition order, then the source.
  ///
  /// Consumes the pipeline, so each `close` runs exactly once. Close failures
  /// are logged and do not stop the remaining releases.
  pub(crate) async fn release(mut self) {
    while let Some(stage) = self.stages.pop() {
      if let Err(e) = stage.close().await {
        event!(Level::WARN, link = %stage.link_definition(), error = %e, "Failed to close link.");
      }
    }
    if let Err(e) = self.source.close().await {
      event!(Level::WARN, source = %self.source.definition(), error = %e, "Failed to close source.");
    }
  }
}

/// Links of one kind, in definition order.
pub(crate) fn stages_of(
  stages: &[Box<dyn LinkProcessor>],
  kind: LinkKind,
) -> impl Iterator<Item = &dyn LinkProcessor> {
  stages
    .iter()
    .map(|s| s.as_ref())
    .filter(move |s| s.link_definition().kind == kind)
}

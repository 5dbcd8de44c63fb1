// harvester/src/core/link.rs

//! Defines the `LinkProcessor` trait, the uniform wrapper the pipeline uses for
//! every stage after the source, together with the two connector-facing traits
//! it wraps: `Transformer` and `Destination`.

use crate::core::control::PublishOutcome;
use crate::core::data_reference::DataReference;
use crate::core::definition::LinkDefinition;
use crate::error::HarvestResult;
use async_trait::async_trait;

/// One pipeline stage.
///
/// The pipeline calls `process` for each record in source order and `close`
/// exactly once when it shuts down, whatever the reason.
#[async_trait]
pub trait LinkProcessor: Send + Sync {
  /// The definition this stage was built from.
  fn link_definition(&self) -> &LinkDefinition;

  /// Transforms or publishes one record.
  ///
  /// `Ok(None)` drops the record from the rest of the pipeline.
  async fn process(&self, data_ref: DataReference) -> HarvestResult<Option<DataReference>>;

  /// Releases connections, handles or caches held by the stage.
  async fn close(&self) -> HarvestResult<()>;
}

/// A pure `DataReference -> DataReference` stage. Returning `None` filters the
/// record out.
#[async_trait]
pub trait Transformer: Send + Sync {
  async fn transform(&self, data_ref: DataReference) -> HarvestResult<Option<DataReference>>;

  async fn close(&self) -> HarvestResult<()> {
    Ok(())
  }
}

/// A terminal stage publishing records to an external catalog or store.
#[async_trait]
pub trait Destination: Send + Sync {
  async fn publish(&self, data_ref: &DataReference) -> HarvestResult<PublishOutcome>;

  async fn close(&self) -> HarvestResult<()> {
    Ok(())
  }
}

pub struct TransformerProcessor {
  definition: LinkDefinition,
  transformer: Box<dyn Transformer>,
}

impl TransformerProcessor {
  pub fn new(definition: LinkDefinition, transformer: Box<dyn Transformer>) -> Self {
    Self {
      definition,
      transformer,
    }
  }
}

#[async_trait]
impl LinkProcessor for TransformerProcessor {
  fn link_definition(&self) -> &LinkDefinition {
    &self.definition
  }

  async fn process(&self, data_ref: DataReference) -> HarvestResult<Option<DataReference>> {
    self.transformer.transform(data_ref).await
  }

  async fn close(&self) -> HarvestResult<()> {
    self.transformer.close().await
  }
}

/// Adapts a `Destination` to the link contract: publishing is the transform,
/// and the destination's verdict is stamped on the returned reference.
pub struct DestinationProcessor {
  definition: LinkDefinition,
  destination: Box<dyn Destination>,
}

impl DestinationProcessor {
  pub fn new(definition: LinkDefinition, destination: Box<dyn Destination>) -> Self {
    Self {
      definition,
      destination,
    }
  }
}

#[async_trait]
impl LinkProcessor for DestinationProcessor {
  fn link_definition(&self) -> &LinkDefinition {
    &self.definition
  }

  async fn process(&self, data_ref: DataReference) -> HarvestResult<Option<DataReference>> {
    let outcome = self.destination.publish(&data_ref).await?;
    Ok(Some(data_ref.with_outcome(outcome)))
  }

  async fn close(&self) -> HarvestResult<()> {
    self.destination.close().await
  }
}

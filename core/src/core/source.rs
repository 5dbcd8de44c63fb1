// harvester/src/core/source.rs

//! Pull-based record sources.
//!
//! A `Source` yields a finite, non-restartable sequence of `DataReference`s.
//! `next` is the main suspension point of a pipeline: it may wait on network
//! or disk I/O. Two ready-made implementations are provided: `IterSource` for
//! records already in memory and `ChannelSource` for records produced by a
//! separate task through a bounded channel.

use crate::core::data_reference::DataReference;
use crate::core::definition::EntityDefinition;
use crate::error::{HarvestError, HarvestResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::mpsc;

#[async_trait]
pub trait Source: Send {
  /// The definition this source was built from.
  fn definition(&self) -> &EntityDefinition;

  /// Pulls the next record. `Ok(None)` marks the end of the stream; once
  /// returned, the source is exhausted for good.
  ///
  /// An `Err` whose `is_fatal()` is false only costs the current record.
  async fn next(&mut self) -> HarvestResult<Option<DataReference>>;

  async fn close(&mut self) -> HarvestResult<()> {
    Ok(())
  }
}

/// Serves records from memory.
pub struct IterSource {
  definition: EntityDefinition,
  records: VecDeque<HarvestResult<DataReference>>,
}

impl IterSource {
  pub fn new(definition: EntityDefinition, records: impl IntoIterator<Item = DataReference>) -> Self {
    Self {
      definition,
      records: records.into_iter().map(Ok).collect(),
    }
  }

  /// Like `new`, but individual entries may be errors surfaced from `next`.
  pub fn from_results(
    definition: EntityDefinition,
    records: impl IntoIterator<Item = HarvestResult<DataReference>>,
  ) -> Self {
    Self {
      definition,
      records: records.into_iter().collect(),
    }
  }
}

#[async_trait]
impl Source for IterSource {
  fn definition(&self) -> &EntityDefinition {
    &self.definition
  }

  async fn next(&mut self) -> HarvestResult<Option<DataReference>> {
    self.records.pop_front().transpose()
  }
}

/// Producer half of a [`ChannelSource`].
pub type RecordSender = mpsc::Sender<HarvestResult<DataReference>>;

/// Source fed by a producer task. The stream ends when every sender is dropped.
pub struct ChannelSource {
  definition: EntityDefinition,
  receiver: mpsc::Receiver<HarvestResult<DataReference>>,
  exhausted: bool,
}

impl ChannelSource {
  /// Creates a bounded channel of `buffer` records and returns both halves.
  pub fn channel(definition: EntityDefinition, buffer: usize) -> (RecordSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (
      tx,
      ChannelSource {
        definition,
        receiver: rx,
        exhausted: false,
      },
    )
  }
}

#[async_trait]
impl Source for ChannelSource {
  fn definition(&self) -> &EntityDefinition {
    &self.definition
  }

  async fn next(&mut self) -> HarvestResult<Option<DataReference>> {
    if self.exhausted {
      return Ok(None);
    }
    match self.receiver.recv().await {
      Some(item) => item.map(Some),
      None => {
        self.exhausted = true;
        Ok(None)
      }
    }
  }

  async fn close(&mut self) -> HarvestResult<()> {
    // Producers blocked on a full channel see the closure and stop.
    self.receiver.close();
    self.exhausted = true;
    Ok(())
  }
}

impl From<mpsc::error::SendError<HarvestResult<DataReference>>> for HarvestError {
  fn from(_: mpsc::error::SendError<HarvestResult<DataReference>>) -> Self {
    HarvestError::source("channel", "record channel closed by the consumer", true)
  }
}

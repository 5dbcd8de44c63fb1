// harvester/src/trigger/immediate.rs

use crate::core::definition::TaskDefinition;
use crate::error::HarvestResult;
use crate::trigger::{Trigger, TriggerContext};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Submits the task exactly once, inline, and holds nothing afterwards.
#[derive(Debug, Default)]
pub struct ImmediateTrigger;

impl ImmediateTrigger {
  pub const TYPE: &'static str = "IMMEDIATE";

  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl Trigger for ImmediateTrigger {
  fn trigger_type(&self) -> &str {
    Self::TYPE
  }

  async fn initiate(
    &self,
    context: Arc<dyn TriggerContext>,
    task: Arc<TaskDefinition>,
    _arguments: &BTreeMap<String, String>,
  ) -> HarvestResult<()> {
    context.submit(task).await?;
    Ok(())
  }
}

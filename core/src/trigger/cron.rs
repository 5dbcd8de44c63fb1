// harvester/src/trigger/cron.rs

use crate::core::definition::TaskDefinition;
use crate::error::{HarvestError, HarvestResult};
use crate::trigger::{fire, required_argument, ScheduledTask, Trigger, TriggerContext};
use async_trait::async_trait;
use chrono::Utc;
use ::cron::Schedule;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

/// Submits the task at every instant matched by a cron expression.
///
/// Argument `cron` uses the seconds-first syntax of the `cron` crate, e.g.
/// `0 0 2 * * *` for 02:00:00 every day.
#[derive(Default)]
pub struct CronTrigger {
  timer: ScheduledTask,
}

impl CronTrigger {
  pub const TYPE: &'static str = "CRON";

  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Trigger for CronTrigger {
  fn trigger_type(&self) -> &str {
    Self::TYPE
  }

  async fn initiate(
    &self,
    context: Arc<dyn TriggerContext>,
    task: Arc<TaskDefinition>,
    arguments: &BTreeMap<String, String>,
  ) -> HarvestResult<()> {
    let expression = required_argument(arguments, "cron", Self::TYPE)?;
    let schedule = Schedule::from_str(expression)
      .map_err(|e| HarvestError::invalid_definition(format!("invalid cron expression '{}': {}", expression, e)))?;
    if schedule.upcoming(Utc).next().is_none() {
      return Err(HarvestError::invalid_definition(format!(
        "cron expression '{}' never fires",
        expression
      )));
    }

    self.timer.start(Self::TYPE, move || {
      tokio::spawn(async move {
        let mut cursor = Utc::now();
        loop {
          let Some(next) = schedule.after(&cursor).next() else {
            event!(Level::INFO, task = %task.title(), "Cron schedule exhausted.");
            break;
          };
          event!(Level::DEBUG, next_run = %next, task = %task.title(), "Cron trigger waiting.");
          let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
          tokio::time::sleep(wait).await;
          fire(&context, &task, CronTrigger::TYPE).await;
          // Never fire the same instant twice, even if the clock lags behind.
          cursor = next.max(Utc::now());
        }
      })
    })
  }

  fn is_active(&self) -> bool {
    self.timer.is_running()
  }

  async fn close(&self) -> HarvestResult<()> {
    self.timer.cancel();
    Ok(())
  }
}

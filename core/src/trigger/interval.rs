// harvester/src/trigger/interval.rs

use crate::core::definition::TaskDefinition;
use crate::error::{HarvestError, HarvestResult};
use crate::trigger::{fire, required_argument, ScheduledTask, Trigger, TriggerContext};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{event, Level};

/// Submits the task every `period`, first after `delay` (default: right away).
///
/// Arguments: `period` (required), `delay` (optional). Both accept `500ms`,
/// `30s`, `15m`, `2h`, `1d` or a bare number of seconds.
#[derive(Default)]
pub struct IntervalTrigger {
  timer: ScheduledTask,
}

impl IntervalTrigger {
  pub const TYPE: &'static str = "INTERVAL";

  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Trigger for IntervalTrigger {
  fn trigger_type(&self) -> &str {
    Self::TYPE
  }

  async fn initiate(
    &self,
    context: Arc<dyn TriggerContext>,
    task: Arc<TaskDefinition>,
    arguments: &BTreeMap<String, String>,
  ) -> HarvestResult<()> {
    let period = parse_period(required_argument(arguments, "period", Self::TYPE)?)?;
    if period.is_zero() {
      return Err(HarvestError::invalid_definition("INTERVAL trigger period must be positive"));
    }
    let delay = match arguments.get("delay") {
      Some(delay) => parse_period(delay)?,
      None => Duration::ZERO,
    };
    let start = Instant::now()
      .checked_add(delay)
      .filter(|start| start.checked_add(period).is_some())
      .ok_or_else(|| HarvestError::invalid_definition("INTERVAL trigger delay or period is out of range"))?;

    self.timer.start(Self::TYPE, move || {
      tokio::spawn(async move {
        event!(Level::DEBUG, ?period, ?delay, task = %task.title(), "Interval trigger scheduled.");
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
          ticker.tick().await;
          fire(&context, &task, IntervalTrigger::TYPE).await;
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

/// Parses `500ms`, `30s`, `15m`, `2h`, `1d` or bare seconds.
pub fn parse_period(text: &str) -> HarvestResult<Duration> {
  let text = text.trim();
  let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
  let (digits, unit) = text.split_at(split);
  let value: u64 = digits
    .parse()
    .map_err(|_| HarvestError::invalid_definition(format!("invalid period '{}'", text)))?;
  let seconds_per_unit = match unit.trim() {
    "ms" => return Ok(Duration::from_millis(value)),
    "" | "s" => 1,
    "m" => 60,
    "h" => 3_600,
    "d" => 86_400,
    other => {
      return Err(HarvestError::invalid_definition(format!(
        "invalid period unit '{}' in '{}'",
        other, text
      )))
    }
  };
  value
    .checked_mul(seconds_per_unit)
    .map(Duration::from_secs)
    .ok_or_else(|| HarvestError::invalid_definition(format!("period '{}' is out of range", text)))
}

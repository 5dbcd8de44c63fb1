// tests/trigger_tests.rs
mod common;

use common::*;
use harvester::trigger::interval::parse_period;
use harvester::trigger::{CronTrigger, ImmediateTrigger, IntervalTrigger};
use harvester::{Engine, EngineConfig, HarvestError, ProcessStatus, Trigger};
use serial_test::serial;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn engine(harness: &Harness) -> Engine {
  Engine::in_memory(EngineConfig::default(), harness.registry.clone())
}

#[tokio::test]
#[serial]
async fn test_immediate_trigger_submits_exactly_once() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let trigger = ImmediateTrigger::new();

  trigger
    .initiate(engine.trigger_context(), Arc::new(abc_task("r1")), &BTreeMap::new())
    .await
    .unwrap();

  assert!(!trigger.is_active());
  let processes = engine.list_processes();
  assert_eq!(processes.len(), 1);
  assert_ne!(processes[0].process.status(), ProcessStatus::Submitted);
  assert_eq!(processes[0].process.wait().await, ProcessStatus::Completed);
  assert_eq!(trigger.trigger_type(), "IMMEDIATE");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_interval_trigger_fires_every_period_until_closed() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let trigger = IntervalTrigger::new();

  trigger
    .initiate(engine.trigger_context(), Arc::new(abc_task("r1")), &args(&[("period", "10s")]))
    .await
    .unwrap();
  assert!(trigger.is_active());

  // Fires at 0s, 10s and 20s.
  tokio::time::sleep(Duration::from_secs(25)).await;
  assert_eq!(engine.list_processes().len(), 3);

  trigger.close().await.unwrap();
  tokio::task::yield_now().await;
  assert!(!trigger.is_active());
  tokio::time::sleep(Duration::from_secs(30)).await;
  assert_eq!(engine.list_processes().len(), 3);

  // Idempotent.
  trigger.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_interval_trigger_honours_initial_delay() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let trigger = IntervalTrigger::new();

  trigger
    .initiate(
      engine.trigger_context(),
      Arc::new(abc_task("r1")),
      &args(&[("period", "1m"), ("delay", "5s")]),
    )
    .await
    .unwrap();

  tokio::time::sleep(Duration::from_secs(4)).await;
  assert!(engine.list_processes().is_empty());
  tokio::time::sleep(Duration::from_secs(2)).await;
  assert_eq!(engine.list_processes().len(), 1);
  trigger.close().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_interval_trigger_rejects_bad_arguments() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let task = Arc::new(abc_task("r1"));

  for bad in [
    args(&[]),
    args(&[("period", "0s")]),
    args(&[("period", "10 fortnights")]),
    args(&[("period", "300000000000000d")]),
    args(&[("period", "1h"), ("delay", "18446744073709551615")]),
  ] {
    let trigger = IntervalTrigger::new();
    let result = trigger.initiate(engine.trigger_context(), Arc::clone(&task), &bad).await;
    assert!(
      matches!(result, Err(HarvestError::InvalidDefinition { .. })),
      "accepted {:?}",
      bad
    );
    assert!(!trigger.is_active());
  }
  assert!(engine.list_processes().is_empty());
}

#[tokio::test]
#[serial]
async fn test_recurring_trigger_cannot_be_initiated_twice() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let task = Arc::new(abc_task("r1"));
  let trigger = IntervalTrigger::new();
  let hourly = args(&[("period", "1h"), ("delay", "1h")]);

  trigger
    .initiate(engine.trigger_context(), Arc::clone(&task), &hourly)
    .await
    .unwrap();
  let again = trigger.initiate(engine.trigger_context(), task, &hourly).await;

  assert!(matches!(again, Err(HarvestError::IllegalState { .. })));
  trigger.close().await.unwrap();
}

#[test]
fn test_parse_period_units() {
  assert_eq!(parse_period("500ms").unwrap(), Duration::from_millis(500));
  assert_eq!(parse_period("30").unwrap(), Duration::from_secs(30));
  assert_eq!(parse_period("30s").unwrap(), Duration::from_secs(30));
  assert_eq!(parse_period("15m").unwrap(), Duration::from_secs(900));
  assert_eq!(parse_period(" 2h ").unwrap(), Duration::from_secs(7_200));
  assert_eq!(parse_period("1d").unwrap(), Duration::from_secs(86_400));
  assert!(parse_period("").is_err());
  assert!(parse_period("ms").is_err());
  assert!(parse_period("5w").is_err());
  assert!(matches!(
    parse_period("300000000000000d"),
    Err(HarvestError::InvalidDefinition { .. })
  ));
  assert_eq!(
    parse_period("18446744073709551615ms").unwrap(),
    Duration::from_millis(u64::MAX)
  );
}

#[tokio::test]
#[serial]
async fn test_cron_trigger_rejects_invalid_expressions() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let task = Arc::new(abc_task("r1"));

  for bad in [
    args(&[]),
    args(&[("cron", "not a cron line")]),
    // Only matches instants in the year 2000.
    args(&[("cron", "0 0 0 1 1 * 2000")]),
  ] {
    let trigger = CronTrigger::new();
    let result = trigger.initiate(engine.trigger_context(), Arc::clone(&task), &bad).await;
    assert!(
      matches!(result, Err(HarvestError::InvalidDefinition { .. })),
      "accepted {:?}",
      bad
    );
  }
}

#[tokio::test]
#[serial]
async fn test_cron_trigger_fires_on_schedule() {
  setup_tracing();
  let harness = Harness::new();
  let engine = engine(&harness);
  let trigger = CronTrigger::new();

  trigger
    .initiate(
      engine.trigger_context(),
      Arc::new(abc_task("r1")),
      &args(&[("cron", "* * * * * *")]),
    )
    .await
    .unwrap();
  assert!(trigger.is_active());

  assert!(eventually(|| !engine.list_processes().is_empty()).await);
  trigger.close().await.unwrap();
  tokio::task::yield_now().await;
  assert!(!trigger.is_active());
}

// tests/registry_tests.rs
mod common;

use common::*;
use harvester::{
  ConnectorRegistry, DataReference, EntityDefinition, HarvestError, LinkDefinition, Pipeline, PipelineOptions,
  PublishOutcome, TaskDefinition,
};

#[test]
fn test_new_registry_holds_builtin_triggers_and_default_processor() {
  let registry = ConnectorRegistry::new();
  assert_eq!(registry.trigger_types(), vec!["CRON", "IMMEDIATE", "INTERVAL"]);
  assert_eq!(registry.processor_types(), vec!["DEFAULT"]);
  assert!(registry.source_types().is_empty());
  assert!(registry.transformer_types().is_empty());
  assert!(registry.destination_types().is_empty());

  assert_eq!(registry.create_trigger("CRON").unwrap().trigger_type(), "CRON");
  assert!(matches!(
    registry.create_trigger("HOURLY"),
    Err(HarvestError::InvalidDefinition { .. })
  ));
}

#[test]
fn test_registered_types_are_listed_sorted() {
  let harness = Harness::new();
  assert_eq!(harness.registry.source_types(), vec!["BROKEN", "CHANNEL", "MEMORY"]);
  assert_eq!(harness.registry.transformer_types(), vec!["TAG"]);
  assert_eq!(harness.registry.destination_types(), vec!["BROKEN", "RECORD"]);
}

#[test]
fn test_validate_task_reports_the_unknown_type() {
  let harness = Harness::new();
  assert!(harness.registry.validate_task(&abc_task("r1")).is_ok());

  let task = abc_task("r1").with_destination(EntityDefinition::new("SOLR"));
  match harness.registry.validate_task(&task) {
    Err(HarvestError::InvalidDefinition { message }) => {
      assert_eq!(message, "unknown destination type 'SOLR'");
    }
    other => panic!("Expected InvalidDefinition, got {:?}", other),
  }
}

#[test]
fn test_default_processor_reads_max_failures() {
  let registry = ConnectorRegistry::new();

  assert_eq!(registry.pipeline_options(None).unwrap(), PipelineOptions::default());
  let limited = EntityDefinition::new("DEFAULT").with_property("maxFailures", "5");
  assert_eq!(registry.pipeline_options(Some(&limited)).unwrap().max_failures, Some(5));

  let invalid = EntityDefinition::new("DEFAULT").with_property("maxFailures", "lots");
  assert!(matches!(
    registry.pipeline_options(Some(&invalid)),
    Err(HarvestError::InvalidDefinition { .. })
  ));
}

#[test]
fn test_custom_processor_can_be_registered() {
  let registry = ConnectorRegistry::new();
  registry.register_processor("STRICT", |_| Ok(PipelineOptions { max_failures: Some(0) }));

  let strict = EntityDefinition::new("STRICT");
  assert_eq!(registry.pipeline_options(Some(&strict)).unwrap().max_failures, Some(0));
  assert_eq!(registry.processor_types(), vec!["DEFAULT", "STRICT"]);
}

#[tokio::test]
async fn test_create_link_wraps_transformers_and_destinations() {
  setup_tracing();
  let harness = Harness::new();

  let transformer = harness.registry.create_link(&LinkDefinition::transformer(tag("A"))).unwrap();
  assert!(!transformer.link_definition().is_destination());
  let destination = harness.registry.create_link(&LinkDefinition::destination(record("C"))).unwrap();
  assert!(destination.link_definition().is_destination());

  let published = destination
    .process(DataReference::new("r1", "memory://r1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(published.outcome(), Some(PublishOutcome::Added));

  let mismatched = harness.registry.create_link(&LinkDefinition::destination(tag("A")));
  assert!(matches!(mismatched, Err(HarvestError::InvalidDefinition { .. })));
}

#[tokio::test]
async fn test_pipeline_build_acquires_every_link_in_order() {
  setup_tracing();
  let harness = Harness::new();
  let task: TaskDefinition = abc_task("r1").with_destination(record("D"));

  let pipeline = Pipeline::build(&harness.registry, &task).await.unwrap();
  assert_eq!(pipeline.stage_count(), 4);
  assert!(harness.journal.entries().is_empty());
}

// tests/definition_tests.rs
use harvester::{EntityDefinition, LinkKind, TaskDefinition, TriggerInstanceDefinition};

fn ckan_source() -> EntityDefinition {
  EntityDefinition::new("CKAN")
    .with_label("Open data portal")
    .with_property("url", "https://data.example.org")
}

#[test]
fn test_links_keep_definition_order_per_kind() {
  let task = TaskDefinition::new("portal", ckan_source())
    .with_transformer(EntityDefinition::new("XSLT").with_label("A"))
    .with_destination(EntityDefinition::new("GPT").with_label("C"))
    .with_transformer(EntityDefinition::new("XSLT").with_label("B"));

  let transformers: Vec<&str> = task.transformers().map(|l| l.action.display_name()).collect();
  let publishers: Vec<&str> = task.publishers().map(|l| l.action.display_name()).collect();
  assert_eq!(transformers, vec!["A", "B"]);
  assert_eq!(publishers, vec!["C"]);
  assert_eq!(task.destinations[1].kind, LinkKind::Destination);
}

#[test]
fn test_title_falls_back_to_source_label() {
  assert_eq!(TaskDefinition::new("nightly", ckan_source()).title(), "nightly");
  assert_eq!(TaskDefinition::new("  ", ckan_source()).title(), "Open data portal");
  assert_eq!(TaskDefinition::new("", EntityDefinition::new("WAF")).title(), "WAF");
}

#[test]
fn test_equality_ignores_name_reference_and_keywords() {
  let a = TaskDefinition::new("one", ckan_source()).with_keyword("geo");
  let mut b = TaskDefinition::new("two", ckan_source());
  b.reference = Some("stored-1".to_string());
  assert_eq!(a, b);

  let c = TaskDefinition::new("one", ckan_source()).with_destination(EntityDefinition::new("GPT"));
  assert_ne!(a, c);
}

#[test]
fn test_keywords_are_deduplicated() {
  let mut task = TaskDefinition::new("t", ckan_source()).with_keyword("geo").with_keyword("geo");
  assert_eq!(task.keywords(), ["geo".to_string()]);

  task.set_keywords(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
  assert_eq!(task.keywords(), ["a".to_string(), "b".to_string()]);
}

#[test]
fn test_incremental_scope_prefers_storage_reference() {
  let mut task = TaskDefinition::new("t", ckan_source());
  assert!(task.incremental_scope().starts_with("t|CKAN"));
  task.reference = Some("42".to_string());
  assert_eq!(task.incremental_scope(), "42");
}

#[test]
fn test_task_definition_json_shape() {
  let json = serde_json::json!({
    "name": "portal",
    "source": { "type": "CKAN", "properties": { "url": "https://data.example.org" } },
    "destinations": [
      { "kind": "transformer", "action": { "type": "XSLT" } },
      { "kind": "destination", "action": { "type": "GPT", "label": "catalog" } }
    ],
    "keywords": ["geo", "water", "geo"],
    "incremental": true,
    "ref": "abc-123"
  });
  let task: TaskDefinition = serde_json::from_value(json).unwrap();

  assert_eq!(task.source.property("url"), Some("https://data.example.org"));
  assert_eq!(task.destinations.len(), 2);
  assert_eq!(task.keywords(), ["geo".to_string(), "water".to_string()]);
  assert!(task.incremental);
  assert!(!task.ignore_robots_txt);
  assert!(task.processor.is_none());
  assert_eq!(task.reference.as_deref(), Some("abc-123"));

  let back = serde_json::to_value(&task).unwrap();
  assert_eq!(back["ignoreRobotsTxt"], false);
  assert_eq!(back["ref"], "abc-123");
  assert!(back.get("processor").is_none());
}

#[test]
fn test_trigger_instance_from_entity_copies_arguments() {
  let task = TaskDefinition::new("t", ckan_source());
  let trigger = EntityDefinition::new("CRON").with_property("cron", "0 0 2 * * *");

  let instance = TriggerInstanceDefinition::from_entity(&trigger, task.clone());
  assert_eq!(instance.trigger_type, "CRON");
  assert_eq!(instance.properties.get("cron").map(String::as_str), Some("0 0 2 * * *"));
  assert_eq!(instance.task_definition, task);
}

#[test]
fn test_display_names_processor_default() {
  let rendered = TaskDefinition::new("portal", ckan_source()).to_string();
  assert!(rendered.starts_with("NAME: portal, PROCESSOR: DEFAULT, SOURCE: CKAN"));
}

// harvester/src/core/definition.rs

//! Configuration envelopes handed to the engine by the control plane.
//!
//! Every pluggable component (source, transformer, destination, trigger,
//! processor) is described by the same `EntityDefinition`: a type name that
//! selects a registered factory plus a flat bag of string properties.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Generic `{type, label, properties}` description of a pluggable component.
///
/// Built once and never mutated afterwards; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
  #[serde(rename = "type")]
  entity_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  label: Option<String>,
  #[serde(default)]
  properties: BTreeMap<String, String>,
}

impl EntityDefinition {
  pub fn new(entity_type: impl Into<String>) -> Self {
    Self {
      entity_type: entity_type.into(),
      label: None,
      properties: BTreeMap::new(),
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  pub fn with_properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: Into<String>,
    V: Into<String>,
  {
    self
      .properties
      .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
    self
  }

  pub fn entity_type(&self) -> &str {
    &self.entity_type
  }

  pub fn label(&self) -> Option<&str> {
    self.label.as_deref()
  }

  pub fn properties(&self) -> &BTreeMap<String, String> {
    &self.properties
  }

  pub fn property(&self, key: &str) -> Option<&str> {
    self.properties.get(key).map(String::as_str)
  }

  /// Label when present, type name otherwise.
  pub fn display_name(&self) -> &str {
    self.label.as_deref().unwrap_or(&self.entity_type)
  }
}

impl fmt::Display for EntityDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {:?}", self.entity_type, self.properties)
  }
}

/// Role of a link within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
  Transformer,
  Destination,
}

/// An entity definition plus the routing metadata telling the pipeline whether
/// it belongs to the transformer chain or to the destination fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDefinition {
  pub kind: LinkKind,
  pub action: EntityDefinition,
}

impl LinkDefinition {
  pub fn transformer(action: EntityDefinition) -> Self {
    Self {
      kind: LinkKind::Transformer,
      action,
    }
  }

  pub fn destination(action: EntityDefinition) -> Self {
    Self {
      kind: LinkKind::Destination,
      action,
    }
  }

  pub fn is_destination(&self) -> bool {
    self.kind == LinkKind::Destination
  }
}

impl fmt::Display for LinkDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match self.kind {
      LinkKind::Transformer => "transformer",
      LinkKind::Destination => "destination",
    };
    write!(f, "{}:{}", kind, self.action)
  }
}

/// Persisted unit of harvest configuration.
///
/// The engine only ever reads a task definition; processes share it through an
/// `Arc`. `source` is mandatory by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
  #[serde(default)]
  pub name: String,
  /// `None` selects the default processor.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub processor: Option<EntityDefinition>,
  pub source: EntityDefinition,
  #[serde(default)]
  pub destinations: Vec<LinkDefinition>,
  #[serde(default, deserialize_with = "deserialize_keywords")]
  keywords: Vec<String>,
  #[serde(default)]
  pub incremental: bool,
  #[serde(default)]
  pub ignore_robots_txt: bool,
  /// Storage record reference; assigned by the task store, never by the engine.
  #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
  pub reference: Option<String>,
}

impl TaskDefinition {
  pub fn new(name: impl Into<String>, source: EntityDefinition) -> Self {
    Self {
      name: name.into(),
      processor: None,
      source,
      destinations: Vec::new(),
      keywords: Vec::new(),
      incremental: false,
      ignore_robots_txt: false,
      reference: None,
    }
  }

  pub fn with_processor(mut self, processor: EntityDefinition) -> Self {
    self.processor = Some(processor);
    self
  }

  pub fn with_transformer(mut self, transformer: EntityDefinition) -> Self {
    self.destinations.push(LinkDefinition::transformer(transformer));
    self
  }

  pub fn with_destination(mut self, destination: EntityDefinition) -> Self {
    self.destinations.push(LinkDefinition::destination(destination));
    self
  }

  pub fn with_incremental(mut self, incremental: bool) -> Self {
    self.incremental = incremental;
    self
  }

  pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
    self.add_keyword(keyword);
    self
  }

  pub fn keywords(&self) -> &[String] {
    &self.keywords
  }

  /// Adds a keyword unless an identical one is already present.
  pub fn add_keyword(&mut self, keyword: impl Into<String>) {
    let keyword = keyword.into();
    if !self.keywords.contains(&keyword) {
      self.keywords.push(keyword);
    }
  }

  pub fn set_keywords(&mut self, keywords: impl IntoIterator<Item = String>) {
    self.keywords.clear();
    for keyword in keywords {
      self.add_keyword(keyword);
    }
  }

  pub fn transformers(&self) -> impl Iterator<Item = &LinkDefinition> {
    self.destinations.iter().filter(|l| !l.is_destination())
  }

  pub fn publishers(&self) -> impl Iterator<Item = &LinkDefinition> {
    self.destinations.iter().filter(|l| l.is_destination())
  }

  /// Human readable title used for processes created from this task.
  pub fn title(&self) -> String {
    if self.name.trim().is_empty() {
      self.source.display_name().to_string()
    } else {
      self.name.clone()
    }
  }

  /// Key under which incremental bookkeeping for this task is stored.
  ///
  /// Prefers the storage reference so that renaming a task keeps its history.
  pub fn incremental_scope(&self) -> String {
    match &self.reference {
      Some(reference) => reference.clone(),
      None => format!("{}|{}", self.title(), self.source),
    }
  }
}

// Keeps the first occurrence of each keyword, in order.
fn deserialize_keywords<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
  let mut keywords: Vec<String> = Vec::new();
  for keyword in Vec::<String>::deserialize(deserializer)? {
    if !keywords.contains(&keyword) {
      keywords.push(keyword);
    }
  }
  Ok(keywords)
}

impl PartialEq for TaskDefinition {
  // Deduplication key: processor, source and destinations. name/ref/keywords ignored.
  fn eq(&self, other: &Self) -> bool {
    self.processor == other.processor && self.source == other.source && self.destinations == other.destinations
  }
}

impl Eq for TaskDefinition {}

impl fmt::Display for TaskDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let destinations: Vec<String> = self.destinations.iter().map(ToString::to_string).collect();
    write!(
      f,
      "NAME: {}, PROCESSOR: {}, SOURCE: {}, DESTINATIONS: [{}], INCREMENTAL: {}, IGNOREROBOTSTXT: {}",
      self.name,
      self
        .processor
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "DEFAULT".to_string()),
      self.source,
      destinations.join(", "),
      self.incremental,
      self.ignore_robots_txt
    )
  }
}

/// Binds a trigger type and its arguments to one task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInstanceDefinition {
  #[serde(rename = "type")]
  pub trigger_type: String,
  pub task_definition: TaskDefinition,
  #[serde(default)]
  pub properties: BTreeMap<String, String>,
}

impl TriggerInstanceDefinition {
  pub fn new(trigger_type: impl Into<String>, task_definition: TaskDefinition) -> Self {
    Self {
      trigger_type: trigger_type.into(),
      task_definition,
      properties: BTreeMap::new(),
    }
  }

  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  /// Builds an instance definition from a trigger `EntityDefinition`, the way
  /// a stored task gets scheduled.
  pub fn from_entity(trigger: &EntityDefinition, task_definition: TaskDefinition) -> Self {
    Self {
      trigger_type: trigger.entity_type().to_string(),
      task_definition,
      properties: trigger.properties().clone(),
    }
  }
}

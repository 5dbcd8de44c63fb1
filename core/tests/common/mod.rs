// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester::{
  ChannelSource, ConnectorRegistry, DataReference, Destination, EntityDefinition, HarvestError, HarvestResult,
  IterSource, ProcessListener, ProcessStatus, PublishOutcome, RecordSender, Source, TaskDefinition, Transformer,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

// --- Shared journal of connector calls ---

/// Ordered log of everything the test connectors did, e.g. `transform:A:r1`,
/// `publish:C:r1`, `close:A`.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
  pub fn push(&self, entry: impl Into<String>) {
    self.0.lock().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().clone()
  }

  pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
    self.0.lock().iter().filter(|e| e.starts_with(prefix)).cloned().collect()
  }

  pub fn count(&self, entry: &str) -> usize {
    self.0.lock().iter().filter(|e| e.as_str() == entry).count()
  }
}

fn id_set(definition: &EntityDefinition, key: &str) -> HashSet<String> {
  definition
    .property(key)
    .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
    .unwrap_or_default()
}

fn name_of(definition: &EntityDefinition) -> String {
  definition.display_name().to_string()
}

// --- Sources ---

/// `MEMORY` source: properties `records` (comma separated ids), `modified`
/// (RFC 3339, applied to every record), `fail` (ids surfaced as recoverable
/// source errors), `fatal` (id surfaced as a fatal source error).
struct JournaledSource {
  inner: IterSource,
  journal: Journal,
}

#[async_trait]
impl Source for JournaledSource {
  fn definition(&self) -> &EntityDefinition {
    self.inner.definition()
  }

  async fn next(&mut self) -> HarvestResult<Option<DataReference>> {
    self.inner.next().await
  }

  async fn close(&mut self) -> HarvestResult<()> {
    self.journal.push("close:source");
    Ok(())
  }
}

fn memory_source(definition: &EntityDefinition, journal: Journal) -> HarvestResult<Box<dyn Source>> {
  let modified: Option<DateTime<Utc>> = match definition.property("modified") {
    Some(text) => Some(
      DateTime::parse_from_rfc3339(text)
        .map_err(|e| HarvestError::invalid_definition(e.to_string()))?
        .with_timezone(&Utc),
    ),
    None => None,
  };
  let failing = id_set(definition, "fail");
  let fatal = id_set(definition, "fatal");
  let records: Vec<HarvestResult<DataReference>> = definition
    .property("records")
    .unwrap_or_default()
    .split(',')
    .map(str::trim)
    .filter(|id| !id.is_empty())
    .map(|id| {
      if fatal.contains(id) {
        Err(HarvestError::source("MEMORY", format!("connection lost at {}", id), true))
      } else if failing.contains(id) {
        Err(HarvestError::source("MEMORY", format!("unreadable record {}", id), false))
      } else {
        let mut data_ref = DataReference::new(id, format!("memory://{}", id)).with_content(format!("<{}/>", id));
        if let Some(modified) = modified {
          data_ref = data_ref.with_last_modified(modified);
        }
        Ok(data_ref)
      }
    })
    .collect();
  Ok(Box::new(JournaledSource {
    inner: IterSource::from_results(definition.clone(), records),
    journal,
  }))
}

/// Holds the producer half of the most recent `CHANNEL` source.
#[derive(Clone, Default)]
pub struct SenderSlot(Arc<Mutex<Option<RecordSender>>>);

impl SenderSlot {
  pub fn take(&self) -> Option<RecordSender> {
    self.0.lock().take()
  }

  pub async fn wait_for_sender(&self) -> RecordSender {
    loop {
      if let Some(sender) = self.take() {
        return sender;
      }
      tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
  }
}

// --- Links ---

/// `TAG` transformer: appends its name to the `trail` attribute. Properties
/// `fail`, `drop` and `panic` list record ids to fail, filter or panic on.
struct TagTransformer {
  name: String,
  fail: HashSet<String>,
  drop: HashSet<String>,
  panic: HashSet<String>,
  journal: Journal,
}

#[async_trait]
impl Transformer for TagTransformer {
  async fn transform(&self, data_ref: DataReference) -> HarvestResult<Option<DataReference>> {
    let id = data_ref.id().to_string();
    self.journal.push(format!("transform:{}:{}", self.name, id));
    if self.panic.contains(&id) {
      panic!("transformer {} blew up on {}", self.name, id);
    }
    if self.fail.contains(&id) {
      return Err(HarvestError::transform(self.name.clone(), format!("cannot map {}", id)));
    }
    if self.drop.contains(&id) {
      return Ok(None);
    }
    let trail = match data_ref.attribute("trail") {
      Some(trail) => format!("{}>{}", trail, self.name),
      None => self.name.clone(),
    };
    Ok(Some(data_ref.with_attribute("trail", trail)))
  }

  async fn close(&self) -> HarvestResult<()> {
    self.journal.push(format!("close:{}", self.name));
    Ok(())
  }
}

/// `RECORD` destination: journals each publish with the record's trail.
/// Properties `outcome` (added/updated/deleted/unchanged), `fail` and `fatal`.
pub struct RecordingDestination {
  name: String,
  outcome: PublishOutcome,
  fail: HashSet<String>,
  fatal: HashSet<String>,
  journal: Journal,
}

#[async_trait]
impl Destination for RecordingDestination {
  async fn publish(&self, data_ref: &DataReference) -> HarvestResult<PublishOutcome> {
    let id = data_ref.id();
    if self.fatal.contains(id) {
      return Err(HarvestError::destination(self.name.clone(), "catalog went away", true));
    }
    if self.fail.contains(id) {
      return Err(HarvestError::destination(self.name.clone(), format!("rejected {}", id), false));
    }
    self.journal.push(format!(
      "publish:{}:{}:{}",
      self.name,
      id,
      data_ref.attribute("trail").unwrap_or("-")
    ));
    Ok(self.outcome)
  }

  async fn close(&self) -> HarvestResult<()> {
    self.journal.push(format!("close:{}", self.name));
    Ok(())
  }
}

fn parse_outcome(definition: &EntityDefinition) -> HarvestResult<PublishOutcome> {
  match definition.property("outcome").unwrap_or("added") {
    "added" => Ok(PublishOutcome::Added),
    "updated" => Ok(PublishOutcome::Updated),
    "deleted" => Ok(PublishOutcome::Deleted),
    "unchanged" => Ok(PublishOutcome::Unchanged),
    other => Err(HarvestError::invalid_definition(format!("unknown outcome '{}'", other))),
  }
}

// --- Registry with every test connector ---

pub struct Harness {
  pub registry: Arc<ConnectorRegistry>,
  pub journal: Journal,
  pub senders: SenderSlot,
}

impl Harness {
  pub fn new() -> Self {
    let registry = ConnectorRegistry::new();
    let journal = Journal::default();
    let senders = SenderSlot::default();

    let j = journal.clone();
    registry.register_source("MEMORY", move |definition, _task| memory_source(definition, j.clone()));

    let slot = senders.clone();
    registry.register_source("CHANNEL", move |definition, _task| {
      let (sender, source) = ChannelSource::channel(definition.clone(), 1);
      *slot.0.lock() = Some(sender);
      Ok(Box::new(source) as Box<dyn Source>)
    });

    registry.register_source("BROKEN", |definition, _task| {
      Err(HarvestError::source(definition.entity_type(), "endpoint unreachable", true))
    });

    let j = journal.clone();
    registry.register_transformer("TAG", move |definition| {
      Ok(Box::new(TagTransformer {
        name: name_of(definition),
        fail: id_set(definition, "fail"),
        drop: id_set(definition, "drop"),
        panic: id_set(definition, "panic"),
        journal: j.clone(),
      }) as Box<dyn Transformer>)
    });

    let j = journal.clone();
    registry.register_destination("RECORD", move |definition| {
      Ok(Box::new(RecordingDestination {
        name: name_of(definition),
        outcome: parse_outcome(definition)?,
        fail: id_set(definition, "fail"),
        fatal: id_set(definition, "fatal"),
        journal: j.clone(),
      }) as Box<dyn Destination>)
    });

    registry.register_destination("BROKEN", |definition| {
      Err(HarvestError::destination(name_of(definition), "credentials rejected", true))
    });

    Self {
      registry: Arc::new(registry),
      journal,
      senders,
    }
  }
}

// --- Definition helpers ---

pub fn memory_task(name: &str, records: &str) -> TaskDefinition {
  TaskDefinition::new(name, EntityDefinition::new("MEMORY").with_property("records", records))
}

pub fn tag(name: &str) -> EntityDefinition {
  EntityDefinition::new("TAG").with_label(name)
}

pub fn record(name: &str) -> EntityDefinition {
  EntityDefinition::new("RECORD").with_label(name)
}

/// The canonical `[A, B, C]` pipeline: two transformers and one destination.
pub fn abc_task(records: &str) -> TaskDefinition {
  memory_task("abc", records)
    .with_transformer(tag("A"))
    .with_transformer(tag("B"))
    .with_destination(record("C"))
}

// --- Listener capturing callbacks ---

#[derive(Default)]
pub struct RecordingListener {
  pub statuses: Mutex<Vec<ProcessStatus>>,
  pub errors: Mutex<Vec<String>>,
}

impl ProcessListener for RecordingListener {
  fn status_changed(&self, _process_id: Uuid, status: ProcessStatus) {
    self.statuses.lock().push(status);
  }

  fn on_error(&self, _process_id: Uuid, error: &HarvestError) {
    self.errors.lock().push(error.to_string());
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

/// Polls `condition` every few milliseconds for up to two seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  }
  condition()
}

pub fn channel_task(name: &str) -> TaskDefinition {
  TaskDefinition::new(name, EntityDefinition::new("CHANNEL"))
    .with_transformer(tag("A"))
    .with_destination(record("C"))
}

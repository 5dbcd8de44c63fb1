// harvester/examples/immediate_harvest.rs

use async_trait::async_trait;
use harvester::{
  ConnectorRegistry, DataReference, Destination, Engine, EngineConfig, EntityDefinition, HarvestError, HarvestResult,
  IterSource, PublishOutcome, Source, TaskDefinition, Transformer, TriggerInstanceDefinition,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

// 1. A transformer normalising titles to upper case.
struct UppercaseTitle;

#[async_trait]
impl Transformer for UppercaseTitle {
  async fn transform(&self, data_ref: DataReference) -> HarvestResult<Option<DataReference>> {
    match data_ref.attribute("title").map(str::to_uppercase) {
      Some(title) => Ok(Some(data_ref.with_attribute("title", title))),
      // Records without a title are not worth publishing.
      None => Ok(None),
    }
  }
}

// 2. A destination keeping the latest version of each record in memory.
#[derive(Default)]
struct InMemoryCatalog {
  entries: Mutex<HashMap<String, String>>,
}

struct CatalogDestination(Arc<InMemoryCatalog>);

#[async_trait]
impl Destination for CatalogDestination {
  async fn publish(&self, data_ref: &DataReference) -> HarvestResult<PublishOutcome> {
    let title = data_ref.attribute("title").unwrap_or_default().to_string();
    let previous = self.0.entries.lock().insert(data_ref.id().to_string(), title.clone());
    Ok(match previous {
      None => PublishOutcome::Added,
      Some(old) if old == title => PublishOutcome::Unchanged,
      Some(_) => PublishOutcome::Updated,
    })
  }
}

#[tokio::main]
async fn main() -> Result<(), HarvestError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Immediate Harvest Example ---");

  // 3. Register connector factories under the type names definitions use.
  let catalog = Arc::new(InMemoryCatalog::default());
  let registry = ConnectorRegistry::new();
  registry.register_source("SAMPLE", |definition, _task| {
    let records = vec![
      DataReference::new("doc-1", "sample://doc-1").with_attribute("title", "rivers of europe"),
      DataReference::new("doc-2", "sample://doc-2"),
      DataReference::new("doc-3", "sample://doc-3").with_attribute("title", "soil moisture 2023"),
    ];
    Ok(Box::new(IterSource::new(definition.clone(), records)) as Box<dyn Source>)
  });
  registry.register_transformer("UPPERCASE", |_| Ok(Box::new(UppercaseTitle) as Box<dyn Transformer>));
  let target = Arc::clone(&catalog);
  registry.register_destination("CATALOG", move |_| {
    Ok(Box::new(CatalogDestination(Arc::clone(&target))) as Box<dyn Destination>)
  });

  let engine = Engine::in_memory(EngineConfig::default(), Arc::new(registry));

  // 4. Describe the harvest and trigger it right away.
  let task = TaskDefinition::new("sample portal", EntityDefinition::new("SAMPLE"))
    .with_transformer(EntityDefinition::new("UPPERCASE"))
    .with_destination(EntityDefinition::new("CATALOG"));
  engine
    .schedule_task(TriggerInstanceDefinition::new("IMMEDIATE", task))
    .await?;

  // 5. Wait for the process the trigger submitted and print its report.
  for reference in engine.list_processes() {
    let status = reference.process.wait().await;
    info!("Process {} finished: {}", reference.process_id, status);
    info!("{}", reference.process.report());
  }
  info!("Catalog now holds: {:?}", catalog.entries.lock());

  engine.shutdown().await;
  Ok(())
}

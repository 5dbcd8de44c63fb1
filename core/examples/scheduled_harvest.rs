// harvester/examples/scheduled_harvest.rs

use harvester::{
  ChannelSource, ConnectorRegistry, DataReference, Engine, EngineConfig, EntityDefinition, HarvestError, Source,
  TaskDefinition,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), HarvestError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Scheduled Harvest Example ---");

  // A source fed by a producer task, standing in for a paged remote API.
  let registry = ConnectorRegistry::new();
  registry.register_source("FEED", |definition, _task| {
    let pages: usize = definition.property("pages").and_then(|p| p.parse().ok()).unwrap_or(1);
    let (sender, source) = ChannelSource::channel(definition.clone(), 4);
    tokio::spawn(async move {
      for page in 0..pages {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let record = DataReference::new(format!("page-{}", page), "feed://pages");
        if sender.send(Ok(record)).await.is_err() {
          break; // Consumer closed the source.
        }
      }
    });
    Ok(Box::new(source) as Box<dyn Source>)
  });

  let config = EngineConfig::from_toml_str(
    r#"
      process_ttl_secs = 60
      housekeeping_interval_secs = 5
      shutdown_grace_secs = 2
    "#,
  )?;
  let engine = Engine::in_memory(config, Arc::new(registry));
  engine.start()?;

  // Store the task, then schedule it every second.
  let task_id = engine
    .add_task_definition(TaskDefinition::new(
      "feed",
      EntityDefinition::new("FEED").with_property("pages", "5"),
    ))
    .await?;
  let every_second = EntityDefinition::new("INTERVAL").with_property("period", "1s");
  let trigger = engine.schedule_stored_task(task_id, &every_second).await?;
  info!("Activated trigger {}", trigger.uuid);

  tokio::time::sleep(Duration::from_millis(3_500)).await;
  engine.deactivate_trigger_instance(trigger.uuid).await?;

  for reference in engine.list_processes() {
    let status = reference.process.wait().await;
    let stats = reference.process.statistics();
    info!(
      "Process {} -> {} (harvested {}, published {})",
      reference.process_id,
      status,
      stats.harvested,
      stats.published()
    );
  }

  engine.shutdown().await;
  Ok(())
}

// harvester/src/config.rs

//! Engine settings, loadable from TOML.

use crate::error::{HarvestError, HarvestResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Finished processes older than this are evicted by housekeeping.
  /// `None` keeps them until removed explicitly.
  pub process_ttl_secs: Option<u64>,
  pub housekeeping_interval_secs: u64,
  /// How long `Engine::shutdown` waits for aborted processes to wind down.
  pub shutdown_grace_secs: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      process_ttl_secs: None,
      housekeeping_interval_secs: 60,
      shutdown_grace_secs: 10,
    }
  }
}

impl EngineConfig {
  pub fn from_toml_str(text: &str) -> HarvestResult<Self> {
    let config: EngineConfig = toml::from_str(text).map_err(|e| HarvestError::Configuration {
      message: format!("invalid engine configuration: {}", e),
    })?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> HarvestResult<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| HarvestError::Configuration {
      message: format!("cannot read {}: {}", path.display(), e),
    })?;
    Self::from_toml_str(&text)
  }

  pub fn validate(&self) -> HarvestResult<()> {
    if self.housekeeping_interval_secs == 0 {
      return Err(HarvestError::Configuration {
        message: "housekeeping_interval_secs must be positive".to_string(),
      });
    }
    Ok(())
  }

  pub fn process_ttl(&self) -> Option<Duration> {
    self.process_ttl_secs.map(Duration::from_secs)
  }

  pub fn housekeeping_interval(&self) -> Duration {
    Duration::from_secs(self.housekeeping_interval_secs)
  }

  pub fn shutdown_grace(&self) -> Duration {
    Duration::from_secs(self.shutdown_grace_secs)
  }
}

// harvester/src/core/control.rs

//! Outcome signals reported by destinations, by a pipeline run and by a process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a destination did with a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishOutcome {
  Added,
  Updated,
  Deleted,
  /// The destination already held an identical copy.
  Unchanged,
}

/// Outcome of a full pipeline run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  /// The source's record stream was exhausted.
  Completed,
  /// An abort request was observed between two records.
  Aborted,
}

/// Lifecycle state of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
  Submitted,
  Working,
  Completed,
  Aborted,
  Failed,
}

impl ProcessStatus {
  /// Terminal states are final; nothing transitions out of them.
  pub fn is_terminal(self) -> bool {
    matches!(self, ProcessStatus::Completed | ProcessStatus::Aborted | ProcessStatus::Failed)
  }
}

impl fmt::Display for ProcessStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ProcessStatus::Submitted => "SUBMITTED",
      ProcessStatus::Working => "WORKING",
      ProcessStatus::Completed => "COMPLETED",
      ProcessStatus::Aborted => "ABORTED",
      ProcessStatus::Failed => "FAILED",
    };
    f.write_str(name)
  }
}

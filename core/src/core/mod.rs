pub mod control;
pub mod data_reference;
pub mod definition;
pub mod link;
pub mod source;
pub mod statistics;

pub use control::{PipelineResult, ProcessStatus, PublishOutcome};
pub use data_reference::DataReference;
pub use definition::{EntityDefinition, LinkDefinition, LinkKind, TaskDefinition, TriggerInstanceDefinition};
pub use statistics::{Statistics, StatisticsSnapshot};

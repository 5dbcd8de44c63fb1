// harvester/src/process/mod.rs

//! Process instances: one execution of a task definition, its status machine,
//! cancellation controls and listener hooks.

pub(crate) mod control;
pub mod hooks;
pub mod instance;

pub use hooks::ProcessListener;
pub use instance::{ProcessInstance, ProcessReference, ProcessStatistics};

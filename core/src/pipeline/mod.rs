// harvester/src/pipeline/mod.rs

//! Defines the `Pipeline` (source → transformer chain → destination fan-out),
//! its construction from a task definition and its execution loop.

pub mod definition;
pub mod execution;

pub use definition::{Pipeline, PipelineOptions};

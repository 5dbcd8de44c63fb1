// harvester/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
  /// A task, link or trigger definition is malformed or names an unknown type.
  #[error("Invalid definition: {message}")]
  InvalidDefinition { message: String },

  /// A single record could not be transformed by a pipeline stage.
  #[error("Transform failed in stage '{stage}': {message}")]
  Transform { stage: String, message: String },

  #[error("Source '{source_type}' failed: {message}")]
  Source {
    source_type: String,
    message: String,
    fatal: bool,
  },

  #[error("Destination '{destination}' failed: {message}")]
  Destination {
    destination: String,
    message: String,
    fatal: bool,
  },

  /// A lifecycle operation was requested from a state that does not allow it.
  #[error("Illegal state: {message}")]
  IllegalState { message: String },

  #[error("Data processor error: {message}")]
  Processor { message: String },

  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("Error in connector or external operation. Source: {source}")]
  External {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal harvester error: {0}")]
  Internal(String),
}

impl HarvestError {
  pub fn invalid_definition(message: impl Into<String>) -> Self {
    HarvestError::InvalidDefinition { message: message.into() }
  }

  pub fn transform(stage: impl Into<String>, message: impl Into<String>) -> Self {
    HarvestError::Transform {
      stage: stage.into(),
      message: message.into(),
    }
  }

  pub fn source(source_type: impl Into<String>, message: impl Into<String>, fatal: bool) -> Self {
    HarvestError::Source {
      source_type: source_type.into(),
      message: message.into(),
      fatal,
    }
  }

  pub fn destination(destination: impl Into<String>, message: impl Into<String>, fatal: bool) -> Self {
    HarvestError::Destination {
      destination: destination.into(),
      message: message.into(),
      fatal,
    }
  }

  pub fn illegal_state(message: impl Into<String>) -> Self {
    HarvestError::IllegalState { message: message.into() }
  }

  pub fn processor(message: impl Into<String>) -> Self {
    HarvestError::Processor { message: message.into() }
  }

  /// Whether this error ends the whole process rather than the current record.
  ///
  /// Transform failures and errors bubbling up from connector code are
  /// record-scoped. Source and destination failures carry their own verdict.
  /// Everything else is a setup or lifecycle problem and always fatal.
  pub fn is_fatal(&self) -> bool {
    match self {
      HarvestError::Transform { .. } | HarvestError::External { .. } => false,
      HarvestError::Source { fatal, .. } | HarvestError::Destination { fatal, .. } => *fatal,
      _ => true,
    }
  }
}

impl From<AnyhowError> for HarvestError {
  fn from(err: AnyhowError) -> Self {
    // Connector code often funnels a HarvestError through anyhow; unwrap it
    // instead of nesting it inside External.
    match err.downcast::<HarvestError>() {
      Ok(harvest_err) => harvest_err,
      Err(other) => HarvestError::External { source: other },
    }
  }
}

pub type HarvestResult<T, E = HarvestError> = std::result::Result<T, E>;

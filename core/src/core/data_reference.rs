// harvester/src/core/data_reference.rs

//! The unit of data flowing through a pipeline.

use crate::core::control::PublishOutcome;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One source record: identity, raw payload and modification timestamp.
///
/// A reference is owned by the process that pulled it. Fan-out to several
/// destinations clones it; the payload is shared behind an `Arc` so the clone
/// is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct DataReference {
  id: String,
  source_uri: String,
  last_modified: Option<DateTime<Utc>>,
  content: Arc<[u8]>,
  content_type: Option<String>,
  attributes: BTreeMap<String, String>,
  outcome: Option<PublishOutcome>,
}

impl DataReference {
  pub fn new(id: impl Into<String>, source_uri: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      source_uri: source_uri.into(),
      last_modified: None,
      content: Arc::from(Vec::<u8>::new()),
      content_type: None,
      attributes: BTreeMap::new(),
      outcome: None,
    }
  }

  pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
    self.last_modified = Some(last_modified);
    self
  }

  pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
    self.content = Arc::from(content.into());
    self
  }

  pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
    self.content_type = Some(content_type.into());
    self
  }

  pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.attributes.insert(key.into(), value.into());
    self
  }

  pub(crate) fn with_outcome(mut self, outcome: PublishOutcome) -> Self {
    self.outcome = Some(outcome);
    self
  }

  /// Source-assigned record identity.
  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn source_uri(&self) -> &str {
    &self.source_uri
  }

  pub fn last_modified(&self) -> Option<DateTime<Utc>> {
    self.last_modified
  }

  pub fn content(&self) -> &[u8] {
    &self.content
  }

  /// Payload as UTF-8 text, lossily decoded.
  pub fn content_as_text(&self) -> String {
    String::from_utf8_lossy(&self.content).into_owned()
  }

  pub fn content_type(&self) -> Option<&str> {
    self.content_type.as_deref()
  }

  pub fn attributes(&self) -> &BTreeMap<String, String> {
    &self.attributes
  }

  pub fn attribute(&self, key: &str) -> Option<&str> {
    self.attributes.get(key).map(String::as_str)
  }

  /// Outcome stamped by the destination that last published this reference.
  pub fn outcome(&self) -> Option<PublishOutcome> {
    self.outcome
  }
}

//! Live change notifications.

use std::{borrow::Cow, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The namespace a record id is unique within, e.g. `spool` or `vendor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
  pub const fn from_static(name: &'static str) -> Self { Self(Cow::Borrowed(name)) }

  pub fn new(name: impl Into<String>) -> Self { Self(Cow::Owned(name.into())) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EntityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
  Created,
  Updated,
  Deleted,
}

impl ChangeKind {
  /// Whether this change can move list boundaries or counts.
  pub fn is_structural(self) -> bool { !matches!(self, Self::Updated) }
}

/// A remote creation, update or deletion of one record.
///
/// `payload` carries the full record when the transport provides it. An
/// `updated` event without a payload cannot be patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<P> {
  pub kind:             ChangeKind,
  pub entity_type:      EntityType,
  pub entity_id:        String,
  #[serde(default)]
  pub payload:          Option<P>,
  #[serde(default)]
  pub server_timestamp: Option<DateTime<Utc>>,
}

impl<P> ChangeEvent<P> {
  pub fn new(kind: ChangeKind, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
    Self {
      kind,
      entity_type,
      entity_id: entity_id.into(),
      payload: None,
      server_timestamp: None,
    }
  }

  pub fn with_payload(mut self, payload: P) -> Self {
    self.payload = Some(payload);
    self
  }

  pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
    self.server_timestamp = Some(timestamp);
    self
  }
}

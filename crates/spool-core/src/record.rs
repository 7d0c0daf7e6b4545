//! The `Record` abstraction.

use std::{fmt::Debug, hash::Hash};

/// Any entity with a stable, unique, immutable identifier within its entity
/// type namespace.
///
/// Records are value objects from the cache's point of view: an update
/// replaces the identified entry, it never mutates it.
pub trait Record: Clone + Send + Sync + 'static {
  type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

  fn id(&self) -> Self::Id;
}

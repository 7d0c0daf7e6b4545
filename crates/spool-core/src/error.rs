//! Error types for `spool-core`.

use thiserror::Error;

/// Configuration and validation errors.
#[derive(Debug, Error)]
pub enum Error {
  #[error("page size must be greater than zero")]
  ZeroPageSize,

  #[error("scroll threshold must lie in (0, 1], got {0}")]
  InvalidThreshold(f64),
}

/// Failure of a single page fetch.
///
/// Neither variant is fatal: a transient failure leaves the cache untouched
/// and the next scroll signal retries, an aborted fetch is dropped silently.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  #[error("transient fetch error: {0}")]
  Transient(String),

  #[error("fetch for epoch {epoch} was aborted")]
  Aborted { epoch: u64 },
}

/// A raw record that could not be mapped into its view shape.
#[derive(Debug, Error)]
pub enum ProjectionError {
  #[error("malformed record: {0}")]
  Malformed(String),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

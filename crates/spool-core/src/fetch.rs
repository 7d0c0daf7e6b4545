//! The `PageFetcher` boundary and its request/response types.
//!
//! A fetcher issues exactly one page request and returns. It holds no
//! pagination state and never retries; the caller re-arms on the next scroll
//! signal.

use std::future::Future;

use crate::{
  cache::Epoch,
  error::FetchError,
  query::{Condition, ListQuery, Sorter},
};

/// One page request, tagged with the epoch it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub filter:    Vec<Condition>,
  pub sorter:    Vec<Sorter>,
  /// One-based page index.
  pub page:      u32,
  pub page_size: u32,
  pub epoch:     Epoch,
}

impl PageRequest {
  pub(crate) fn for_query(query: &ListQuery, page: u32, epoch: Epoch) -> Self {
    Self {
      filter: query.filter.clone(),
      sorter: query.sorter.clone(),
      page,
      page_size: query.page_size(),
      epoch,
    }
  }

  /// Zero-based offset of the first record on this page.
  pub fn offset(&self) -> u64 {
    u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
  }
}

/// An ordered batch plus the server's total match count at fetch time.
///
/// `total` is a snapshot; live events may make it stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
  pub records: Vec<T>,
  pub total:   u64,
}

/// Abstraction over the remote collection's query API.
///
/// Returns a `Send` future so fetches can run on spawned tokio tasks.
pub trait PageFetcher: Send + Sync + 'static {
  type Raw: Clone + Send + Sync + 'static;

  fn fetch<'a>(
    &'a self,
    request: &'a PageRequest,
  ) -> impl Future<Output = Result<Page<Self::Raw>, FetchError>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn offsets_are_one_based_pages() {
    let query = ListQuery::new(25).unwrap();
    let offset = |page| PageRequest::for_query(&query, page, Epoch::default()).offset();
    assert_eq!(offset(1), 0);
    assert_eq!(offset(2), 25);
    assert_eq!(offset(4), 75);
  }
}

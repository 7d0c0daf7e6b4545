//! The incremental list cache, an append-only, id-deduplicated sequence.
//!
//! The cache is a pure state machine. It never performs I/O itself: it hands
//! out [`PendingFetch`]es describing the page to request and accepts the
//! outcome back through [`IncrementalListCache::complete`]. The owner is
//! responsible for running the fetch; this keeps every mutation on the
//! owner's single thread of control while fetches are in flight.
//!
//! Three rules make the concurrent sources safe to interleave:
//!
//! - every response is tagged with the [`Epoch`] it was requested under, and
//!   responses from an older epoch are discarded on arrival;
//! - `is_loading_more` admits one pagination fetch at a time, so pages of an
//!   epoch are requested and applied in strictly increasing order;
//! - records are only ever appended if their id is unseen, and a patch only
//!   replaces an id that is already present.

use std::{collections::HashMap, fmt};

use tracing::debug;

use crate::{
  error::FetchError,
  fetch::PageRequest,
  project::ProjectedPage,
  query::ListQuery,
  record::Record,
};

// ─── Epoch ───────────────────────────────────────────────────────────────────

/// Tags one logical view configuration (filter + sorter + page size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
  pub fn get(self) -> u64 { self.0 }

  fn next(self) -> Self { Self(self.0 + 1) }
}

impl fmt::Display for Epoch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Fetch bookkeeping ───────────────────────────────────────────────────────

/// Why a page is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
  /// The next page of pagination.
  Append,
  /// The one-shot page-1 refresh after a structural change.
  Refresh,
}

/// A fetch the owner must run and report back with [`IncrementalListCache::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
  pub request: PageRequest,
  pub kind:    FetchKind,
}

/// The effect of one completed fetch on the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
  /// The response belonged to an older epoch and was dropped.
  Stale { epoch: Epoch },
  /// The fetch was aborted; nothing changed.
  Aborted,
  /// The fetch failed; nothing changed and the slot is free for a retry.
  Failed(FetchError),
  /// The page was merged.
  Applied {
    kind:     FetchKind,
    appended: usize,
    patched:  usize,
    /// A refresh requested while this one was in flight, to run next.
    follow_up: Option<PendingFetch>,
  },
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Accumulated, ordered, duplicate-free sequence of projected records.
#[derive(Debug)]
pub struct IncrementalListCache<R: Record> {
  query:            ListQuery,
  sequence:         Vec<R>,
  positions:        HashMap<R::Id, usize>,
  /// Next page index to request (one-based).
  cursor:           u32,
  has_more:         bool,
  is_loading_more:  bool,
  epoch:            Epoch,
  last_total:       Option<u64>,
  /// Records of this epoch's pages that failed to project.
  skipped:          u64,
  refresh_inflight: bool,
  refresh_queued:   bool,
}

impl<R: Record> IncrementalListCache<R> {
  /// Create an empty cache bound to `query` at epoch 0.
  ///
  /// Nothing is requested until [`request_next_page`](Self::request_next_page).
  pub fn new(query: ListQuery) -> Self {
    Self {
      query,
      sequence: Vec::new(),
      positions: HashMap::new(),
      cursor: 1,
      has_more: true,
      is_loading_more: false,
      epoch: Epoch::default(),
      last_total: None,
      skipped: 0,
      refresh_inflight: false,
      refresh_queued: false,
    }
  }

  // ── Accessors ─────────────────────────────────────────────────────────────

  pub fn records(&self) -> &[R] { &self.sequence }

  pub fn len(&self) -> usize { self.sequence.len() }

  pub fn is_empty(&self) -> bool { self.sequence.is_empty() }

  pub fn get(&self, id: &R::Id) -> Option<&R> {
    self.positions.get(id).map(|&at| &self.sequence[at])
  }

  pub fn query(&self) -> &ListQuery { &self.query }

  pub fn epoch(&self) -> Epoch { self.epoch }

  pub fn cursor(&self) -> u32 { self.cursor }

  pub fn has_more(&self) -> bool { self.has_more }

  pub fn is_loading_more(&self) -> bool { self.is_loading_more }

  pub fn is_refreshing(&self) -> bool { self.refresh_inflight }

  /// The server total as of the last successful fetch of this epoch.
  pub fn last_total(&self) -> Option<u64> { self.last_total }

  // ── Mutations ─────────────────────────────────────────────────────────────

  /// Bind the cache to a new view configuration.
  ///
  /// Clears the sequence, rewinds the cursor and bumps the epoch. Fetches
  /// still in flight for the previous epoch are not cancelled; their
  /// responses are discarded when they arrive.
  pub fn reset(&mut self, query: ListQuery) -> Epoch {
    self.query = query;
    self.sequence.clear();
    self.positions.clear();
    self.cursor = 1;
    self.has_more = true;
    self.is_loading_more = false;
    self.last_total = None;
    self.skipped = 0;
    self.refresh_inflight = false;
    self.refresh_queued = false;
    self.epoch = self.epoch.next();
    debug!(epoch = %self.epoch, "list cache reset");
    self.epoch
  }

  /// Claim the pagination slot and describe the next page to fetch.
  ///
  /// Returns `None` while a page is already loading or when the collection is
  /// exhausted, so repeated scroll signals are harmless.
  pub fn request_next_page(&mut self) -> Option<PendingFetch> {
    if self.is_loading_more || !self.has_more {
      return None;
    }
    self.is_loading_more = true;
    Some(PendingFetch {
      request: PageRequest::for_query(&self.query, self.cursor, self.epoch),
      kind:    FetchKind::Append,
    })
  }

  /// Replace the record with the same id in place. Returns `false` (and does
  /// nothing) if the id is not materialized in this window.
  pub fn apply_patch(&mut self, record: R) -> bool {
    match self.positions.get(&record.id()) {
      Some(&at) => {
        self.sequence[at] = record;
        true
      }
      None => false,
    }
  }

  /// Schedule the one-shot page-1 refresh after a creation or deletion.
  ///
  /// If a refresh is already in flight, another one is queued behind it and
  /// handed out as the `follow_up` of its completion, so a burst of calls
  /// yields at most two fetches. If the in-flight refresh fails, the queued
  /// one is dropped and the owner is expected to schedule a retry.
  pub fn invalidate_structure(&mut self) -> Option<PendingFetch> {
    if self.refresh_inflight {
      self.refresh_queued = true;
      return None;
    }
    self.refresh_inflight = true;
    Some(PendingFetch {
      request: PageRequest::for_query(&self.query, 1, self.epoch),
      kind:    FetchKind::Refresh,
    })
  }

  /// Merge the outcome of a fetch previously handed out by this cache.
  pub fn complete(
    &mut self,
    fetch: &PendingFetch,
    outcome: Result<ProjectedPage<R>, FetchError>,
  ) -> Completion {
    let request = &fetch.request;
    if request.epoch != self.epoch {
      debug!(
        stale = %request.epoch,
        current = %self.epoch,
        page = request.page,
        "discarding response from a previous epoch"
      );
      return Completion::Stale {
        epoch: request.epoch,
      };
    }

    match fetch.kind {
      FetchKind::Append => self.is_loading_more = false,
      FetchKind::Refresh => self.refresh_inflight = false,
    }

    let page = match outcome {
      Ok(page) => page,
      Err(FetchError::Aborted { .. }) => {
        return Completion::Aborted;
      }
      Err(e) => {
        if fetch.kind == FetchKind::Refresh {
          // The owner reschedules the failed refresh, which covers any
          // request queued behind it.
          self.refresh_queued = false;
        }
        return Completion::Failed(e);
      }
    };

    // An empty page means the server has nothing at this offset, even if a
    // concurrent change left `total` above what was materialized.
    let exhausted = fetch.kind == FetchKind::Append && page.records.is_empty() && page.skipped == 0;

    let (appended, patched) = match fetch.kind {
      FetchKind::Append => {
        self.skipped += page.skipped as u64;
        (self.merge(page.records, false), 0)
      }
      FetchKind::Refresh => {
        let before = self.sequence.len();
        let patched = self.merge_refresh(page.records);
        (self.sequence.len() - before, patched)
      }
    };

    self.cursor = self.cursor.max(request.page + 1);
    self.last_total = Some(page.total);
    self.has_more =
      !exhausted && (self.sequence.len() as u64).saturating_add(self.skipped) < page.total;

    let follow_up = if fetch.kind == FetchKind::Refresh && self.refresh_queued {
      self.refresh_queued = false;
      self.invalidate_structure()
    } else {
      None
    };

    debug!(
      epoch = %self.epoch,
      page = request.page,
      kind = ?fetch.kind,
      appended,
      patched,
      len = self.sequence.len(),
      total = page.total,
      has_more = self.has_more,
      "page merged"
    );

    Completion::Applied {
      kind: fetch.kind,
      appended,
      patched,
      follow_up,
    }
  }

  // ── Merge helpers ─────────────────────────────────────────────────────────

  /// Append records whose id is unseen, in batch order. Returns the number
  /// appended. With `patch_existing`, ids already present are replaced in
  /// place instead of ignored.
  fn merge(&mut self, records: Vec<R>, patch_existing: bool) -> usize {
    let mut appended = 0;
    for record in records {
      let id = record.id();
      match self.positions.get(&id) {
        Some(&at) => {
          if patch_existing {
            self.sequence[at] = record;
          }
        }
        None => {
          self.positions.insert(id, self.sequence.len());
          self.sequence.push(record);
          appended += 1;
        }
      }
    }
    appended
  }

  /// Union a fresh page 1 with the sequence. Returns how many existing
  /// entries were refreshed in place.
  fn merge_refresh(&mut self, records: Vec<R>) -> usize {
    let patched = records
      .iter()
      .filter(|r| self.positions.contains_key(&r.id()))
      .count();
    self.merge(records, true);
    patched
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Item {
    id:   u32,
    name: String,
  }

  impl Record for Item {
    type Id = u32;

    fn id(&self) -> u32 { self.id }
  }

  fn item(id: u32) -> Item {
    Item {
      id,
      name: format!("item {id}"),
    }
  }

  fn page(ids: &[u32], total: u64) -> Result<ProjectedPage<Item>, FetchError> {
    Ok(ProjectedPage::new(ids.iter().copied().map(item).collect(), total))
  }

  fn ids(cache: &IncrementalListCache<Item>) -> Vec<u32> {
    cache.records().iter().map(|i| i.id).collect()
  }

  fn cache(page_size: u32) -> IncrementalListCache<Item> {
    let mut c = IncrementalListCache::new(ListQuery::new(page_size).unwrap());
    c.reset(ListQuery::new(page_size).unwrap());
    c
  }

  #[test]
  fn reset_bumps_epoch_and_rewinds() {
    let mut c = cache(2);
    let e1 = c.epoch();
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 5));
    assert_eq!(c.cursor(), 2);

    let e2 = c.reset(ListQuery::new(2).unwrap());
    assert!(e2 > e1);
    assert!(c.is_empty());
    assert_eq!(c.cursor(), 1);
    assert!(c.has_more());
    assert!(!c.is_loading_more());
    assert_eq!(c.last_total(), None);
  }

  #[test]
  fn request_is_idempotent_while_loading() {
    let mut c = cache(2);
    let first = c.request_next_page();
    assert!(first.is_some());
    assert!(c.request_next_page().is_none());
    assert!(c.request_next_page().is_none());
    assert!(c.is_loading_more());
  }

  #[test]
  fn request_carries_query_and_epoch() {
    let mut c = IncrementalListCache::<Item>::new(ListQuery::new(3).unwrap());
    let epoch = c.reset(
      ListQuery::new(3)
        .unwrap()
        .with_filter(vec![crate::Condition::new("material", "PLA")])
        .with_sorter(vec![crate::Sorter::desc("id")]),
    );
    let f = c.request_next_page().unwrap();
    assert_eq!(f.kind, FetchKind::Append);
    assert_eq!(f.request.page, 1);
    assert_eq!(f.request.page_size, 3);
    assert_eq!(f.request.epoch, epoch);
    assert_eq!(f.request.filter[0].field, "material");
    assert_eq!(f.request.sorter[0].field, "id");
  }

  #[test]
  fn pages_are_appended_without_duplicates() {
    let mut c = cache(3);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2, 3], 7));

    // A record was inserted on the server ahead of page 2, shifting `3`
    // onto it a second time.
    let f = c.request_next_page().unwrap();
    assert_eq!(f.request.page, 2);
    let done = c.complete(&f, page(&[3, 4, 5], 7));
    assert!(matches!(done, Completion::Applied { appended: 2, .. }));
    assert_eq!(ids(&c), vec![1, 2, 3, 4, 5]);
    assert!(c.has_more());
  }

  #[test]
  fn has_more_follows_server_total() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 3));
    assert!(c.has_more());
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[3], 3));
    assert!(!c.has_more());
    assert!(c.request_next_page().is_none());
  }

  #[test]
  fn empty_collection_is_exhausted_after_first_page() {
    let mut c = cache(10);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[], 0));
    assert!(!c.has_more());
    assert!(c.is_empty());
  }

  #[test]
  fn empty_page_ends_pagination_despite_stale_total() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 3));
    // Record 3 was deleted before page 2 was served.
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[], 3));
    assert!(!c.has_more());
  }

  #[test]
  fn skipped_records_still_count_towards_total() {
    let mut c = cache(3);
    let f = c.request_next_page().unwrap();
    let mut projected = ProjectedPage::new(vec![item(1), item(3)], 3);
    projected.skipped = 1;
    c.complete(&f, Ok(projected));
    assert_eq!(ids(&c), vec![1, 3]);
    assert!(!c.has_more(), "the malformed record was consumed");
  }

  #[test]
  fn stale_response_is_discarded() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 5));
    let in_flight = c.request_next_page().unwrap();

    let new_epoch = c.reset(ListQuery::new(2).unwrap());
    let fresh = c.request_next_page().unwrap();

    let done = c.complete(&in_flight, page(&[3, 4], 5));
    assert_eq!(done, Completion::Stale {
      epoch: in_flight.request.epoch,
    });
    assert!(c.is_empty());
    assert!(c.is_loading_more(), "the new epoch's fetch is still pending");

    c.complete(&fresh, page(&[10, 11], 2));
    assert_eq!(c.epoch(), new_epoch);
    assert_eq!(ids(&c), vec![10, 11]);
  }

  #[test]
  fn failed_fetch_leaves_state_and_frees_slot() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 5));

    let f = c.request_next_page().unwrap();
    let done = c.complete(&f, Err(FetchError::Transient("503".into())));
    assert_eq!(done, Completion::Failed(FetchError::Transient("503".into())));
    assert_eq!(ids(&c), vec![1, 2]);
    assert_eq!(c.cursor(), 2);
    assert!(!c.is_loading_more());

    let retry = c.request_next_page().unwrap();
    assert_eq!(retry.request.page, 2);
  }

  #[test]
  fn aborted_fetch_is_silent() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    let epoch = f.request.epoch.get();
    assert_eq!(
      c.complete(&f, Err(FetchError::Aborted { epoch })),
      Completion::Aborted
    );
    assert!(c.is_empty());
    assert!(!c.is_loading_more());
  }

  #[test]
  fn patch_replaces_in_place_and_never_grows() {
    let mut c = cache(3);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2, 3], 3));

    let renamed = Item {
      id:   2,
      name: "renamed".into(),
    };
    assert!(c.apply_patch(renamed.clone()));
    assert_eq!(c.records()[1], renamed);
    assert_eq!(c.len(), 3);

    assert!(!c.apply_patch(item(99)), "absent ids are ignored");
    assert_eq!(c.len(), 3);
    assert_eq!(ids(&c), vec![1, 2, 3]);
  }

  #[test]
  fn refresh_unions_by_id_and_appends_new_at_end() {
    let mut c = cache(3);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2, 3], 6));
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[4, 5, 6], 6));

    // Record 2 was deleted and 9 created at the head.
    let refresh = c.invalidate_structure().unwrap();
    assert_eq!(refresh.kind, FetchKind::Refresh);
    assert_eq!(refresh.request.page, 1);
    let mut fresh = page(&[9, 1, 3], 6).unwrap();
    fresh.records[1].name = "fresh".into();
    let done = c.complete(&refresh, Ok(fresh));

    assert_eq!(done, Completion::Applied {
      kind:      FetchKind::Refresh,
      appended:  1,
      patched:   2,
      follow_up: None,
    });
    assert_eq!(ids(&c), vec![1, 2, 3, 4, 5, 6, 9]);
    assert_eq!(c.get(&1).unwrap().name, "fresh");
    assert_eq!(c.cursor(), 3, "refresh never moves the cursor backwards");
  }

  #[test]
  fn refresh_requests_coalesce_into_one_follow_up() {
    let mut c = cache(2);
    let first = c.invalidate_structure().unwrap();
    assert!(c.invalidate_structure().is_none());
    assert!(c.invalidate_structure().is_none());

    let done = c.complete(&first, page(&[1, 2], 4));
    let Completion::Applied {
      follow_up: Some(next),
      ..
    } = done
    else {
      panic!("expected a follow-up refresh, got {done:?}");
    };
    assert_eq!(next.kind, FetchKind::Refresh);
    assert!(c.is_refreshing());

    let done = c.complete(&next, page(&[1, 2], 4));
    assert!(matches!(done, Completion::Applied { follow_up: None, .. }));
    assert!(!c.is_refreshing());
  }

  #[test]
  fn refresh_and_pagination_can_overlap() {
    let mut c = cache(2);
    let append = c.request_next_page().unwrap();
    let refresh = c.invalidate_structure().unwrap();

    c.complete(&refresh, page(&[1, 2], 4));
    assert_eq!(c.cursor(), 2);
    c.complete(&append, page(&[1, 2], 4));
    assert_eq!(ids(&c), vec![1, 2]);
    assert_eq!(c.cursor(), 2);

    let next = c.request_next_page().unwrap();
    assert_eq!(next.request.page, 2);
  }

  #[test]
  fn failed_refresh_drops_queued_follow_up() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 4));

    let refresh = c.invalidate_structure().unwrap();
    assert!(c.invalidate_structure().is_none(), "queued behind the first");

    let done = c.complete(&refresh, Err(FetchError::Transient("reset".into())));
    assert!(matches!(done, Completion::Failed(_)));
    assert!(!c.is_refreshing());
    assert_eq!(ids(&c), vec![1, 2]);

    // The retry is a fresh refresh with nothing queued behind it.
    let retry = c.invalidate_structure().unwrap();
    let done = c.complete(&retry, page(&[9, 1], 5));
    assert!(matches!(done, Completion::Applied {
      appended:  1,
      follow_up: None,
      ..
    }));
    assert_eq!(ids(&c), vec![1, 2, 9]);
  }

  #[test]
  fn refresh_from_previous_epoch_is_discarded() {
    let mut c = cache(2);
    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 4));
    let refresh = c.invalidate_structure().unwrap();
    assert!(c.invalidate_structure().is_none());

    c.reset(ListQuery::new(2).unwrap());
    assert!(!c.is_refreshing());
    let fresh = c.request_next_page().unwrap();

    let done = c.complete(&refresh, page(&[9, 1], 5));
    assert_eq!(done, Completion::Stale {
      epoch: refresh.request.epoch,
    });
    assert!(c.is_empty());
    assert!(!c.is_refreshing());
    assert!(c.is_loading_more());

    // The old queue did not survive the reset either.
    c.complete(&fresh, page(&[3, 4], 4));
    let next = c.invalidate_structure().unwrap();
    let done = c.complete(&next, page(&[3, 4], 4));
    assert!(matches!(done, Completion::Applied { follow_up: None, .. }));
    assert_eq!(ids(&c), vec![3, 4]);
  }

  #[test]
  fn three_pages_with_patch_in_between() {
    let mut c = cache(2);

    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[1, 2], 5));
    assert_eq!(ids(&c), vec![1, 2]);
    assert!(c.has_more());

    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[3, 4], 5));
    assert_eq!(ids(&c), vec![1, 2, 3, 4]);
    assert!(c.has_more());

    c.apply_patch(Item {
      id:   3,
      name: "X".into(),
    });
    assert_eq!(c.records()[2].name, "X");

    let f = c.request_next_page().unwrap();
    c.complete(&f, page(&[5], 5));
    assert_eq!(ids(&c), vec![1, 2, 3, 4, 5]);
    assert_eq!(c.records()[2].name, "X");
    assert!(!c.has_more());
    assert!(c.request_next_page().is_none());
  }
}

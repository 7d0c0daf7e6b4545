//! `ListView`: one mounted list, wiring cache, fetcher, projector, live
//! reconciler and scroll trigger together.
//!
//! The view owns its cache exclusively. Page fetches run on spawned tokio
//! tasks and report back over an in-process channel, so all mutations happen
//! inside [`ListView::pump`] or [`ListView::next_event`] on the owner's side.
//! Every mutation bumps [`ListView::revision`] and is reported as a
//! [`ViewEvent`]; that is the whole notification contract with the renderer.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};

use crate::{
  cache::{Completion, Epoch, FetchKind, IncrementalListCache, PendingFetch},
  channel::{LiveEventChannel, LiveSignal, Subscription},
  error::{Error, FetchError, Result},
  event::EntityType,
  fetch::{Page, PageFetcher},
  project::{RecordProjector, project_page},
  query::{Condition, ListQuery, Sorter},
  reconcile::{DEFAULT_COALESCE_WINDOW, LiveReconciler, Reconciliation},
  scroll::{DEFAULT_THRESHOLD, ScrollMetrics, ScrollTrigger},
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Tuning knobs for a [`ListView`].
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
  pub page_size:       u32,
  /// How long structural live events are coalesced before one refresh.
  pub coalesce_window: Duration,
  /// Viewed fraction of content height that requests the next page.
  pub scroll_threshold: f64,
}

impl Default for ViewConfig {
  fn default() -> Self {
    Self {
      page_size:        50,
      coalesce_window:  DEFAULT_COALESCE_WINDOW,
      scroll_threshold: DEFAULT_THRESHOLD,
    }
  }
}

impl ViewConfig {
  pub fn validate(&self) -> Result<()> {
    if self.page_size == 0 {
      return Err(Error::ZeroPageSize);
    }
    ScrollTrigger::new(self.scroll_threshold)?;
    Ok(())
  }
}

// ─── Notifications ────────────────────────────────────────────────────────────

/// A change the rendering layer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
  /// A page was merged into the sequence.
  PageLoaded { page: u32, appended: usize },
  /// The page-1 refresh after a structural change was merged.
  Refreshed { appended: usize, patched: usize },
  /// A live update replaced a materialized record.
  Patched,
  /// A live event scheduled or joined a pending structural refresh.
  RefreshScheduled,
  /// A fetch failed; the sequence is unchanged and a retry is possible.
  FetchFailed(FetchError),
  /// A response from a previous epoch was dropped.
  StaleDiscarded { epoch: Epoch },
  /// The live channel closed; pagination keeps working.
  LiveClosed,
}

impl ViewEvent {
  /// Whether the visible sequence may have changed.
  pub fn is_change(&self) -> bool {
    matches!(
      self,
      Self::PageLoaded { .. } | Self::Refreshed { .. } | Self::Patched
    )
  }
}

struct FetchDone<T> {
  fetch:   PendingFetch,
  outcome: Result<Page<T>, FetchError>,
}

enum Wake<T> {
  Fetch(FetchDone<T>),
  Live(LiveSignal<T>),
  Due,
}

// ─── ListView ─────────────────────────────────────────────────────────────────

/// A mounted, live-updating, incrementally-paginated list.
pub struct ListView<F, P>
where
  F: PageFetcher,
  P: RecordProjector<Raw = F::Raw>,
{
  cache:        IncrementalListCache<P::Output>,
  fetcher:      Arc<F>,
  projector:    Arc<P>,
  reconciler:   LiveReconciler<P>,
  trigger:      ScrollTrigger,
  subscription: Option<Subscription<F::Raw>>,
  done_tx:      mpsc::UnboundedSender<FetchDone<F::Raw>>,
  done_rx:      mpsc::UnboundedReceiver<FetchDone<F::Raw>>,
  revision:     u64,
  last_error:   Option<FetchError>,
}

impl<F, P> ListView<F, P>
where
  F: PageFetcher,
  P: RecordProjector<Raw = F::Raw>,
{
  /// Mount a view: subscribe to `entity_type` on `channel`, bind the cache to
  /// `query`, and request the first page.
  ///
  /// `query`'s page size wins over `config.page_size`. Must be called inside
  /// a tokio runtime.
  pub fn mount(
    fetcher: Arc<F>,
    projector: Arc<P>,
    channel: &LiveEventChannel<F::Raw>,
    entity_type: EntityType,
    config: &ViewConfig,
    query: ListQuery,
  ) -> Result<Self> {
    config.validate()?;
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let mut view = Self {
      cache: IncrementalListCache::new(query.clone()),
      reconciler: LiveReconciler::new(
        entity_type.clone(),
        Arc::clone(&projector),
        config.coalesce_window,
      ),
      trigger: ScrollTrigger::new(config.scroll_threshold)?,
      subscription: Some(channel.subscribe(entity_type)),
      fetcher,
      projector,
      done_tx,
      done_rx,
      revision: 0,
      last_error: None,
    };
    view.reset(query);
    Ok(view)
  }

  /// Like [`mount`](Self::mount), building the query from `config.page_size`.
  pub fn mount_with(
    fetcher: Arc<F>,
    projector: Arc<P>,
    channel: &LiveEventChannel<F::Raw>,
    entity_type: EntityType,
    config: &ViewConfig,
    filter: Vec<Condition>,
    sorter: Vec<Sorter>,
  ) -> Result<Self> {
    let query = ListQuery::new(config.page_size)?
      .with_filter(filter)
      .with_sorter(sorter);
    Self::mount(fetcher, projector, channel, entity_type, config, query)
  }

  /// Release the live subscription and drop all state.
  pub fn unmount(self) {
    debug!(
      entity_type = %self.reconciler.entity_type(),
      "list view unmounted"
    );
  }

  // ── Read access ───────────────────────────────────────────────────────────

  pub fn records(&self) -> &[P::Output] { self.cache.records() }

  pub fn len(&self) -> usize { self.cache.len() }

  pub fn is_empty(&self) -> bool { self.cache.is_empty() }

  pub fn has_more(&self) -> bool { self.cache.has_more() }

  pub fn is_loading_more(&self) -> bool { self.cache.is_loading_more() }

  pub fn is_refreshing(&self) -> bool { self.cache.is_refreshing() }

  pub fn epoch(&self) -> Epoch { self.cache.epoch() }

  pub fn total(&self) -> Option<u64> { self.cache.last_total() }

  pub fn query(&self) -> &ListQuery { self.cache.query() }

  pub fn entity_type(&self) -> &EntityType { self.reconciler.entity_type() }

  /// Incremented on every change to the visible sequence.
  pub fn revision(&self) -> u64 { self.revision }

  /// The most recent fetch failure of this epoch, cleared by the next
  /// successful page.
  pub fn last_error(&self) -> Option<&FetchError> { self.last_error.as_ref() }

  pub fn is_live(&self) -> bool { self.subscription.is_some() }

  // ── Query mutations ───────────────────────────────────────────────────────

  /// Replace the filter. An unchanged filter is a no-op.
  pub fn set_filter(&mut self, filter: Vec<Condition>) {
    if self.cache.query().filter == filter {
      return;
    }
    let query = self.cache.query().clone().with_filter(filter);
    self.reset(query);
  }

  /// Replace the sorter. An unchanged sorter is a no-op.
  pub fn set_sorter(&mut self, sorter: Vec<Sorter>) {
    if self.cache.query().sorter == sorter {
      return;
    }
    let query = self.cache.query().clone().with_sorter(sorter);
    self.reset(query);
  }

  /// Change the page size. An unchanged size is a no-op.
  pub fn set_page_size(&mut self, page_size: u32) -> Result<()> {
    if self.cache.query().page_size() == page_size {
      return Ok(());
    }
    let mut query = self.cache.query().clone();
    query.set_page_size(page_size)?;
    self.reset(query);
    Ok(())
  }

  /// Start over under the current query.
  pub fn reload(&mut self) {
    let query = self.cache.query().clone();
    self.reset(query);
  }

  fn reset(&mut self, query: ListQuery) {
    self.cache.reset(query);
    self.reconciler.clear();
    self.trigger.rearm();
    self.last_error = None;
    self.revision += 1;
    self.request_next_page();
  }

  // ── Fetch triggering ──────────────────────────────────────────────────────

  /// Request the next page unless one is loading or the list is exhausted.
  /// Returns whether a fetch was issued.
  pub fn request_next_page(&mut self) -> bool {
    match self.cache.request_next_page() {
      Some(fetch) => {
        self.spawn(fetch);
        true
      }
      None => false,
    }
  }

  /// Feed a scroll signal observed during animation frame `frame`.
  pub fn on_scroll(&mut self, metrics: ScrollMetrics, frame: u64) -> bool {
    if self.trigger.observe(metrics, frame) {
      return self.request_next_page();
    }
    false
  }

  /// Run the page-1 refresh now, bypassing the coalescing window.
  pub fn invalidate_structure(&mut self) {
    if let Some(fetch) = self.cache.invalidate_structure() {
      self.spawn(fetch);
    }
  }

  fn spawn(&self, fetch: PendingFetch) {
    debug!(
      entity_type = %self.reconciler.entity_type(),
      epoch = %fetch.request.epoch,
      page = fetch.request.page,
      kind = ?fetch.kind,
      "issuing page fetch"
    );
    let fetcher = Arc::clone(&self.fetcher);
    let done_tx = self.done_tx.clone();
    tokio::spawn(async move {
      let outcome = fetcher.fetch(&fetch.request).await;
      // The receiver is gone only if the view was unmounted.
      let _ = done_tx.send(FetchDone { fetch, outcome });
    });
  }

  // ── Driving ───────────────────────────────────────────────────────────────

  /// Apply everything that is ready right now without waiting.
  pub fn pump(&mut self) -> Vec<ViewEvent> {
    let mut events = Vec::new();
    while let Ok(done) = self.done_rx.try_recv() {
      events.extend(self.on_fetch_done(done));
    }
    while let Some(signal) = self.subscription.as_mut().and_then(Subscription::try_recv) {
      events.extend(self.on_live(signal));
    }
    events.extend(self.on_due(Instant::now()));
    events
  }

  /// Wait for the next fetch completion, live event or due refresh, and
  /// apply it. Returns `None` only when nothing can ever happen again: no
  /// fetch pending, no refresh scheduled and the live channel closed.
  pub async fn next_event(&mut self) -> Option<ViewEvent> {
    loop {
      let idle = self.subscription.is_none()
        && self.reconciler.deadline().is_none()
        && !self.cache.is_loading_more()
        && !self.cache.is_refreshing()
        && self.done_rx.is_empty();
      if idle {
        return None;
      }

      let deadline = self.reconciler.deadline();
      let wake = tokio::select! {
        Some(done) = self.done_rx.recv() => Wake::Fetch(done),
        signal = recv_live(&mut self.subscription) => Wake::Live(signal),
        _ = sleep_until(deadline), if deadline.is_some() => Wake::Due,
      };

      let event = match wake {
        Wake::Fetch(done) => self.on_fetch_done(done),
        Wake::Live(signal) => self.on_live(signal),
        Wake::Due => self.on_due(Instant::now()),
      };
      if event.is_some() {
        return event;
      }
    }
  }

  fn on_fetch_done(&mut self, done: FetchDone<F::Raw>) -> Option<ViewEvent> {
    let FetchDone { fetch, outcome } = done;
    let projected = outcome.map(|page| project_page(self.projector.as_ref(), &page));

    match self.cache.complete(&fetch, projected) {
      Completion::Stale { epoch } => Some(ViewEvent::StaleDiscarded { epoch }),
      Completion::Aborted => None,
      Completion::Failed(e) => {
        warn!(
          entity_type = %self.reconciler.entity_type(),
          page = fetch.request.page,
          kind = ?fetch.kind,
          "page fetch failed: {e}"
        );
        match fetch.kind {
          // The layout did not change, so the next scroll signal must be
          // allowed to retry.
          FetchKind::Append => self.trigger.rearm(),
          // Nothing else would ever ask for page 1 again.
          FetchKind::Refresh => {
            self.reconciler.schedule(Instant::now());
          }
        }
        self.last_error = Some(e.clone());
        Some(ViewEvent::FetchFailed(e))
      }
      Completion::Applied {
        kind,
        appended,
        patched,
        follow_up,
      } => {
        if let Some(next) = follow_up {
          self.spawn(next);
        }
        // A page of already-seen ids leaves the layout unchanged, and a
        // signal observed while this page was loading was swallowed.
        if kind == FetchKind::Append {
          self.trigger.rearm();
        }
        self.last_error = None;
        self.revision += 1;
        Some(match kind {
          FetchKind::Append => ViewEvent::PageLoaded {
            page: fetch.request.page,
            appended,
          },
          FetchKind::Refresh => ViewEvent::Refreshed { appended, patched },
        })
      }
    }
  }

  fn on_live(&mut self, signal: LiveSignal<F::Raw>) -> Option<ViewEvent> {
    let now = Instant::now();
    let reconciliation = match signal {
      LiveSignal::Event(event) => self.reconciler.on_event(&event, now),
      LiveSignal::Lagged(missed) => {
        warn!(
          entity_type = %self.reconciler.entity_type(),
          missed,
          "live channel lagged, scheduling refresh"
        );
        self.reconciler.schedule(now)
      }
      LiveSignal::Closed => {
        warn!(
          entity_type = %self.reconciler.entity_type(),
          "live channel closed"
        );
        self.subscription = None;
        return Some(ViewEvent::LiveClosed);
      }
    };

    match reconciliation {
      Reconciliation::Patch(record) => {
        if self.cache.apply_patch(record) {
          self.revision += 1;
          Some(ViewEvent::Patched)
        } else {
          None
        }
      }
      Reconciliation::Scheduled | Reconciliation::Coalesced => {
        Some(ViewEvent::RefreshScheduled)
      }
      Reconciliation::Ignored => None,
    }
  }

  fn on_due(&mut self, now: Instant) -> Option<ViewEvent> {
    if self.reconciler.take_due(now) {
      self.invalidate_structure();
    }
    None
  }
}

async fn recv_live<T: Clone>(subscription: &mut Option<Subscription<T>>) -> LiveSignal<T> {
  match subscription {
    Some(s) => s.recv().await,
    None => std::future::pending().await,
  }
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(at) => tokio::time::sleep_until(at).await,
    None => std::future::pending().await,
  }
}

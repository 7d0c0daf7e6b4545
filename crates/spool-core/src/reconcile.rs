//! Merging live change events into a list view.
//!
//! `updated` events carrying a payload become in-place patches. Creations,
//! deletions, and anything that cannot be patched become a structural
//! invalidation, coalesced so that a burst of N events costs one refresh.
//!
//! The coalescing window opens on the first structural event and is never
//! extended by later ones, so a refresh fires at most one window after the
//! event that asked for it.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
  event::{ChangeEvent, EntityType},
  project::RecordProjector,
};

/// Default coalescing window for structural invalidations.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(250);

/// What the owner should do with one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation<R> {
  /// Replace the record with this id in place.
  Patch(R),
  /// A refresh is now scheduled for [`LiveReconciler::deadline`].
  Scheduled,
  /// A refresh was already scheduled; this event rides along with it.
  Coalesced,
  /// The event belongs to another entity type.
  Ignored,
}

/// Per-view reconciler, bound to one entity type.
pub struct LiveReconciler<P> {
  entity_type: EntityType,
  projector:   Arc<P>,
  window:      Duration,
  deadline:    Option<Instant>,
  coalesced:   usize,
}

impl<P: RecordProjector> LiveReconciler<P> {
  pub fn new(entity_type: EntityType, projector: Arc<P>, window: Duration) -> Self {
    Self {
      entity_type,
      projector,
      window,
      deadline: None,
      coalesced: 0,
    }
  }

  pub fn entity_type(&self) -> &EntityType { &self.entity_type }

  /// When the pending structural refresh is due, if one is pending.
  pub fn deadline(&self) -> Option<Instant> { self.deadline }

  /// Classify one event. `now` is the arrival time.
  pub fn on_event(
    &mut self,
    event: &ChangeEvent<P::Raw>,
    now: Instant,
  ) -> Reconciliation<P::Output> {
    if event.entity_type != self.entity_type {
      return Reconciliation::Ignored;
    }

    if !event.kind.is_structural() {
      match &event.payload {
        Some(raw) => match self.projector.project(raw) {
          Ok(record) => return Reconciliation::Patch(record),
          Err(e) => warn!(
            entity_type = %self.entity_type,
            id = %event.entity_id,
            "live update failed to project, refreshing instead: {e}"
          ),
        },
        None => debug!(
          entity_type = %self.entity_type,
          id = %event.entity_id,
          "live update without payload, refreshing instead"
        ),
      }
    }

    self.schedule(now)
  }

  /// Ask for a structural refresh without an event, e.g. after the live
  /// channel lagged and events were lost.
  pub fn schedule(&mut self, now: Instant) -> Reconciliation<P::Output> {
    self.coalesced += 1;
    if self.deadline.is_some() {
      return Reconciliation::Coalesced;
    }
    self.deadline = Some(now + self.window);
    Reconciliation::Scheduled
  }

  /// Returns `true` exactly once per scheduled refresh, when its deadline
  /// has passed; the caller then invalidates the cache structure.
  pub fn take_due(&mut self, now: Instant) -> bool {
    match self.deadline {
      Some(deadline) if deadline <= now => {
        debug!(
          entity_type = %self.entity_type,
          events = self.coalesced,
          "structural refresh due"
        );
        self.deadline = None;
        self.coalesced = 0;
        true
      }
      _ => false,
    }
  }

  /// Drop any pending refresh; a reset refetches everything anyway.
  pub fn clear(&mut self) {
    self.deadline = None;
    self.coalesced = 0;
  }
}

#[cfg(test)]
mod tests {
  use serde::Deserialize;
  use serde_json::{Value, json};

  use super::*;
  use crate::{error::ProjectionError, event::ChangeKind, record::Record};

  #[derive(Debug, Clone, PartialEq, Deserialize)]
  struct Vendor {
    id:   i64,
    name: String,
  }

  impl Record for Vendor {
    type Id = i64;

    fn id(&self) -> i64 { self.id }
  }

  struct VendorProjector;

  impl RecordProjector for VendorProjector {
    type Raw = Value;
    type Output = Vendor;

    fn project(&self, raw: &Value) -> Result<Vendor, ProjectionError> {
      Ok(serde_json::from_value(raw.clone())?)
    }
  }

  const VENDOR: EntityType = EntityType::from_static("vendor");
  const SPOOL: EntityType = EntityType::from_static("spool");
  const WINDOW: Duration = Duration::from_millis(100);

  fn reconciler() -> LiveReconciler<VendorProjector> {
    LiveReconciler::new(VENDOR, Arc::new(VendorProjector), WINDOW)
  }

  #[test]
  fn update_with_payload_is_a_patch() {
    let mut r = reconciler();
    let event = ChangeEvent::new(ChangeKind::Updated, VENDOR, "3")
      .with_payload(json!({ "id": 3, "name": "X" }));
    assert_eq!(
      r.on_event(&event, Instant::now()),
      Reconciliation::Patch(Vendor {
        id:   3,
        name: "X".into(),
      })
    );
    assert!(r.deadline().is_none());
  }

  #[test]
  fn other_entity_types_are_ignored() {
    let mut r = reconciler();
    let event = ChangeEvent::new(ChangeKind::Created, SPOOL, "1");
    assert_eq!(r.on_event(&event, Instant::now()), Reconciliation::Ignored);
    assert!(r.deadline().is_none());
  }

  #[test]
  fn structural_events_coalesce_within_window() {
    let mut r = reconciler();
    let start = Instant::now();
    let created = ChangeEvent::new(ChangeKind::Created, VENDOR, "8");
    let deleted = ChangeEvent::new(ChangeKind::Deleted, VENDOR, "2");

    assert_eq!(r.on_event(&created, start), Reconciliation::Scheduled);
    assert_eq!(
      r.on_event(&deleted, start + Duration::from_millis(60)),
      Reconciliation::Coalesced
    );
    assert_eq!(r.deadline(), Some(start + WINDOW), "window is not extended");

    assert!(!r.take_due(start + Duration::from_millis(99)));
    assert!(r.take_due(start + WINDOW));
    assert!(!r.take_due(start + WINDOW), "fires once");
    assert!(r.deadline().is_none());
  }

  #[test]
  fn unpatchable_updates_fall_back_to_refresh() {
    let mut r = reconciler();
    let now = Instant::now();
    let bare = ChangeEvent::new(ChangeKind::Updated, VENDOR, "3");
    assert_eq!(r.on_event(&bare, now), Reconciliation::Scheduled);

    let malformed = ChangeEvent::new(ChangeKind::Updated, VENDOR, "4")
      .with_payload(json!({ "id": "four" }));
    assert_eq!(r.on_event(&malformed, now), Reconciliation::Coalesced);
  }

  #[test]
  fn clear_drops_pending_refresh() {
    let mut r = reconciler();
    let now = Instant::now();
    r.schedule(now);
    r.clear();
    assert!(!r.take_due(now + WINDOW));
  }
}

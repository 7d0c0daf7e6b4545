//! Typed publish/subscribe channel for live change events.
//!
//! One channel is shared by every view of an application. Each view holds a
//! [`Subscription`] scoped to its entity type; dropping the subscription
//! unsubscribes, so teardown is released on every exit path.

use tokio::sync::broadcast::{
  self,
  error::{RecvError, TryRecvError},
};
use tracing::debug;

use crate::event::{ChangeEvent, EntityType};

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast source of [`ChangeEvent`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LiveEventChannel<P> {
  sender: broadcast::Sender<ChangeEvent<P>>,
}

impl<P: Clone + Send + 'static> Default for LiveEventChannel<P> {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl<P: Clone + Send + 'static> LiveEventChannel<P> {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self { sender }
  }

  /// Publish an event to all current subscribers. Returns the number of
  /// subscribers that received it; zero is not an error.
  pub fn publish(&self, event: ChangeEvent<P>) -> usize {
    self.sender.send(event).unwrap_or(0)
  }

  /// Subscribe to events of one entity type.
  pub fn subscribe(&self, entity_type: EntityType) -> Subscription<P> {
    debug!(%entity_type, "live subscription acquired");
    Subscription {
      entity_type,
      receiver: self.sender.subscribe(),
    }
  }

  pub fn subscriber_count(&self) -> usize { self.sender.receiver_count() }
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveSignal<P> {
  Event(ChangeEvent<P>),
  /// The subscriber fell behind and `n` events were dropped.
  Lagged(u64),
  /// The channel has no publishers left.
  Closed,
}

/// A per-view subscription filtered to one entity type.
#[derive(Debug)]
pub struct Subscription<P> {
  entity_type: EntityType,
  receiver:    broadcast::Receiver<ChangeEvent<P>>,
}

impl<P: Clone> Subscription<P> {
  pub fn entity_type(&self) -> &EntityType { &self.entity_type }

  /// Wait for the next event of this subscription's entity type.
  pub async fn recv(&mut self) -> LiveSignal<P> {
    loop {
      match self.receiver.recv().await {
        Ok(event) if event.entity_type == self.entity_type => {
          return LiveSignal::Event(event);
        }
        Ok(_) => continue,
        Err(RecvError::Lagged(n)) => return LiveSignal::Lagged(n),
        Err(RecvError::Closed) => return LiveSignal::Closed,
      }
    }
  }

  /// Non-blocking variant of [`recv`](Self::recv). `None` means nothing is
  /// queued right now.
  pub fn try_recv(&mut self) -> Option<LiveSignal<P>> {
    loop {
      match self.receiver.try_recv() {
        Ok(event) if event.entity_type == self.entity_type => {
          return Some(LiveSignal::Event(event));
        }
        Ok(_) => continue,
        Err(TryRecvError::Empty) => return None,
        Err(TryRecvError::Lagged(n)) => return Some(LiveSignal::Lagged(n)),
        Err(TryRecvError::Closed) => return Some(LiveSignal::Closed),
      }
    }
  }
}

impl<P> Drop for Subscription<P> {
  fn drop(&mut self) {
    debug!(entity_type = %self.entity_type, "live subscription released");
  }
}

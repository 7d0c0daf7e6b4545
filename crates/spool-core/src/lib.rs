//! Client-side incremental list synchronizer.
//!
//! Turns a paginated, filterable, sortable remote collection into a
//! continuously-growing, live-updating, duplicate-free local sequence driven
//! by scroll position.
//!
//! This crate is deliberately free of HTTP, WebSocket and terminal
//! dependencies. The remote query API is reached through [`PageFetcher`],
//! push notifications arrive over a [`LiveEventChannel`], and entity shapes
//! are handled by a [`RecordProjector`]. [`ListView`] wires them together.

pub mod cache;
pub mod channel;
pub mod error;
pub mod event;
pub mod fetch;
pub mod project;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod scroll;
pub mod view;

pub use cache::{Completion, Epoch, FetchKind, IncrementalListCache, PendingFetch};
pub use channel::{LiveEventChannel, LiveSignal, Subscription};
pub use error::{Error, FetchError, ProjectionError, Result};
pub use event::{ChangeEvent, ChangeKind, EntityType};
pub use fetch::{Page, PageFetcher, PageRequest};
pub use project::{ProjectedPage, RecordProjector};
pub use query::{Condition, ListQuery, SortDirection, Sorter};
pub use reconcile::{LiveReconciler, Reconciliation};
pub use record::Record;
pub use scroll::{ScrollMetrics, ScrollTrigger};
pub use view::{ListView, ViewConfig, ViewEvent};

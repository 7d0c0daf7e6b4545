//! Application state machine and event dispatcher.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde_json::Value;
use spool_core::{
  Condition, EntityType, ListView, LiveEventChannel, RecordProjector, ScrollMetrics,
  SortDirection, Sorter, ViewConfig, ViewEvent,
};

use crate::{
  client::{ApiClient, HttpPageFetcher},
  model::{FilamentProjector, SpoolProjector, Tabular, VendorProjector},
};

// ─── Resources ────────────────────────────────────────────────────────────────

/// Static description of one list tab.
#[derive(Debug)]
pub struct Resource {
  pub title:        &'static str,
  /// API path segment, also the live-event entity type.
  pub path:         &'static str,
  /// Server-side filter field used by `/` search.
  pub search_field: &'static str,
  /// Sort fields cycled with `s`; the first is the default.
  pub sort_fields:  &'static [&'static str],
  pub archivable:   bool,
}

pub static SPOOLS: Resource = Resource {
  title:        "Spools",
  path:         "spool",
  search_field: "filament.name",
  sort_fields:  &["id", "filament.name", "filament.material", "remaining_weight", "location"],
  archivable:   true,
};

pub static FILAMENTS: Resource = Resource {
  title:        "Filaments",
  path:         "filament",
  search_field: "name",
  sort_fields:  &["id", "vendor.name", "name", "material"],
  archivable:   false,
};

pub static VENDORS: Resource = Resource {
  title:        "Vendors",
  path:         "vendor",
  search_field: "name",
  sort_fields:  &["id", "name"],
  archivable:   false,
};

// ─── Panes ────────────────────────────────────────────────────────────────────

/// Object-safe face of a mounted list tab, so tabs over different row types
/// can live side by side.
pub trait ListPane {
  fn resource(&self) -> &'static Resource;
  fn columns(&self) -> &'static [&'static str];
  fn widths(&self) -> &'static [u16];
  /// Cells of the rows in `start..start + count`.
  fn rows(&self, start: usize, count: usize) -> Vec<Vec<String>>;

  fn len(&self) -> usize;
  fn total(&self) -> Option<u64>;
  fn has_more(&self) -> bool;
  fn is_busy(&self) -> bool;
  fn last_error(&self) -> Option<String>;
  fn search(&self) -> &str;
  fn sort_label(&self) -> String;
  fn show_archived(&self) -> bool;

  fn cursor(&self) -> usize;
  fn offset(&self) -> usize;
  fn viewport(&self) -> usize;
  fn move_cursor(&mut self, delta: isize);
  fn jump(&mut self, to_end: bool);
  /// Record how many rows fit on screen; keeps the cursor visible.
  fn set_viewport(&mut self, rows: usize);
  /// Feed the current scroll geometry to the view's trigger.
  fn scroll_signal(&mut self, frame: u64);

  fn set_search(&mut self, text: String);
  fn cycle_sort(&mut self);
  fn flip_sort(&mut self);
  fn toggle_archived(&mut self);
  fn reload(&mut self);
  /// Apply ready fetches and live events.
  fn pump(&mut self) -> Vec<ViewEvent>;
}

/// One tab: a [`ListView`] plus its cursor and query controls.
pub struct Pane<P>
where
  P: RecordProjector<Raw = Value>,
{
  resource:      &'static Resource,
  view:          ListView<HttpPageFetcher, P>,
  cursor:        usize,
  offset:        usize,
  viewport:      usize,
  search:        String,
  sort:          usize,
  direction:     SortDirection,
  show_archived: bool,
}

impl<P> Pane<P>
where
  P: RecordProjector<Raw = Value>,
  P::Output: Tabular,
{
  pub fn mount(
    resource: &'static Resource,
    client: &ApiClient,
    projector: P,
    channel: &LiveEventChannel<Value>,
    config: &ViewConfig,
  ) -> anyhow::Result<Self> {
    Ok(Self {
      resource,
      view: ListView::mount_with(
        Arc::new(HttpPageFetcher::new(client.clone(), resource.path)),
        Arc::new(projector),
        channel,
        EntityType::from_static(resource.path),
        config,
        vec![],
        vec![Sorter::asc(resource.sort_fields[0])],
      )?,
      cursor: 0,
      offset: 0,
      viewport: 0,
      search: String::new(),
      sort: 0,
      direction: SortDirection::Asc,
      show_archived: false,
    })
  }

  fn filter(&self) -> Vec<Condition> {
    let mut filter = Vec::new();
    if !self.search.is_empty() {
      filter.push(Condition::new(self.resource.search_field, self.search.clone()));
    }
    if self.resource.archivable && self.show_archived {
      filter.push(Condition::new("allow_archived", "true"));
    }
    filter
  }

  fn apply_sort(&mut self) {
    let field = self.resource.sort_fields[self.sort];
    self.view.set_sorter(vec![Sorter {
      field:     field.to_string(),
      direction: self.direction,
    }]);
    self.rewind();
  }

  fn rewind(&mut self) {
    self.cursor = 0;
    self.offset = 0;
  }

  fn follow_cursor(&mut self) {
    if self.cursor < self.offset {
      self.offset = self.cursor;
    } else if self.viewport > 0 && self.cursor >= self.offset + self.viewport {
      self.offset = self.cursor + 1 - self.viewport;
    }
  }
}

impl<P> ListPane for Pane<P>
where
  P: RecordProjector<Raw = Value>,
  P::Output: Tabular,
{
  fn resource(&self) -> &'static Resource { self.resource }

  fn columns(&self) -> &'static [&'static str] { P::Output::COLUMNS }

  fn widths(&self) -> &'static [u16] { P::Output::WIDTHS }

  fn rows(&self, start: usize, count: usize) -> Vec<Vec<String>> {
    self
      .view
      .records()
      .iter()
      .skip(start)
      .take(count)
      .map(Tabular::cells)
      .collect()
  }

  fn len(&self) -> usize { self.view.len() }

  fn total(&self) -> Option<u64> { self.view.total() }

  fn has_more(&self) -> bool { self.view.has_more() }

  fn is_busy(&self) -> bool { self.view.is_loading_more() || self.view.is_refreshing() }

  fn last_error(&self) -> Option<String> { self.view.last_error().map(ToString::to_string) }

  fn search(&self) -> &str { &self.search }

  fn sort_label(&self) -> String {
    format!(
      "{} {}",
      self.resource.sort_fields[self.sort],
      self.direction.as_str()
    )
  }

  fn show_archived(&self) -> bool { self.show_archived }

  fn cursor(&self) -> usize { self.cursor }

  fn offset(&self) -> usize { self.offset }

  fn viewport(&self) -> usize { self.viewport }

  fn move_cursor(&mut self, delta: isize) {
    let len = self.view.len();
    if len == 0 {
      return;
    }
    self.cursor = self.cursor.saturating_add_signed(delta).min(len - 1);
    self.follow_cursor();
  }

  fn jump(&mut self, to_end: bool) {
    self.cursor = if to_end { self.view.len().saturating_sub(1) } else { 0 };
    self.follow_cursor();
  }

  fn set_viewport(&mut self, rows: usize) {
    self.viewport = rows;
    self.cursor = self.cursor.min(self.view.len().saturating_sub(1));
    self.follow_cursor();
  }

  fn scroll_signal(&mut self, frame: u64) {
    let metrics = ScrollMetrics::new(
      self.offset as f64,
      self.view.len() as f64,
      self.viewport as f64,
    );
    self.view.on_scroll(metrics, frame);
  }

  fn set_search(&mut self, text: String) {
    self.search = text.trim().to_string();
    let filter = self.filter();
    self.view.set_filter(filter);
    self.rewind();
  }

  fn cycle_sort(&mut self) {
    self.sort = (self.sort + 1) % self.resource.sort_fields.len();
    self.direction = SortDirection::Asc;
    self.apply_sort();
  }

  fn flip_sort(&mut self) {
    self.direction = self.direction.flipped();
    self.apply_sort();
  }

  fn toggle_archived(&mut self) {
    if !self.resource.archivable {
      return;
    }
    self.show_archived = !self.show_archived;
    let filter = self.filter();
    self.view.set_filter(filter);
    self.rewind();
  }

  fn reload(&mut self) {
    self.view.reload();
    self.rewind();
  }

  fn pump(&mut self) -> Vec<ViewEvent> {
    let events = self.view.pump();
    // A refresh can only append, but keep the cursor in range regardless.
    self.cursor = self.cursor.min(self.view.len().saturating_sub(1));
    events
  }
}

// ─── App ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  /// Keyboard drives the active list.
  Browse,
  /// The user is typing a search query.
  Search,
}

/// Top-level application state.
pub struct App {
  pub mode:         Mode,
  /// One pane per tab, in tab order.
  pub panes:        Vec<Box<dyn ListPane>>,
  pub active:       usize,
  /// Search text being edited (only meaningful in [`Mode::Search`]).
  pub search_input: String,
  /// One-line status message shown in the status bar.
  pub status_msg:   String,
  /// Incremented once per drawn frame.
  pub frame:        u64,
}

impl App {
  /// Mount the spool, filament and vendor tabs. Must be called inside a tokio
  /// runtime; each tab starts loading its first page immediately.
  pub fn new(
    client: &ApiClient,
    channel: &LiveEventChannel<Value>,
    config: &ViewConfig,
  ) -> anyhow::Result<Self> {
    let panes: Vec<Box<dyn ListPane>> = vec![
      Box::new(Pane::mount(&SPOOLS, client, SpoolProjector, channel, config)?),
      Box::new(Pane::mount(&FILAMENTS, client, FilamentProjector, channel, config)?),
      Box::new(Pane::mount(&VENDORS, client, VendorProjector, channel, config)?),
    ];
    Ok(Self {
      mode: Mode::Browse,
      panes,
      active: 0,
      search_input: String::new(),
      status_msg: String::new(),
      frame: 0,
    })
  }

  pub fn pane(&self) -> &dyn ListPane { self.panes[self.active].as_ref() }

  pub fn pane_mut(&mut self) -> &mut dyn ListPane { self.panes[self.active].as_mut() }

  // ── Background work ───────────────────────────────────────────────────────

  /// Apply ready work on every tab, then feed the active tab's scroll
  /// geometry for this frame.
  pub fn tick(&mut self) {
    for (i, pane) in self.panes.iter_mut().enumerate() {
      for event in pane.pump() {
        if i != self.active {
          continue;
        }
        match event {
          ViewEvent::FetchFailed(e) => self.status_msg = format!("Error: {e}"),
          ViewEvent::LiveClosed => self.status_msg = "Live updates stopped".into(),
          ViewEvent::PageLoaded { .. } | ViewEvent::Refreshed { .. } => {
            self.status_msg.clear();
          }
          _ => {}
        }
      }
    }
    let frame = self.frame;
    self.pane_mut().scroll_signal(frame);
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub fn handle_key(&mut self, key: KeyEvent) -> bool {
    // Global: Ctrl-C quits from anywhere.
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return false;
    }

    match self.mode {
      Mode::Search => {
        self.handle_search_key(key);
        true
      }
      Mode::Browse => self.handle_browse_key(key),
    }
  }

  fn handle_search_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Browse;
        self.search_input.clear();
      }
      KeyCode::Enter => {
        self.mode = Mode::Browse;
        let text = std::mem::take(&mut self.search_input);
        self.pane_mut().set_search(text);
      }
      KeyCode::Backspace => {
        self.search_input.pop();
      }
      KeyCode::Char(c) => self.search_input.push(c),
      _ => {}
    }
  }

  fn handle_browse_key(&mut self, key: KeyEvent) -> bool {
    let page = self.page_step();
    match key.code {
      // Quit
      KeyCode::Char('q') => return false,

      // Tabs
      KeyCode::Tab => self.switch_tab(1),
      KeyCode::BackTab => self.switch_tab(self.panes.len() - 1),

      // Navigation
      KeyCode::Down | KeyCode::Char('j') => self.pane_mut().move_cursor(1),
      KeyCode::Up | KeyCode::Char('k') => self.pane_mut().move_cursor(-1),
      KeyCode::PageDown => self.pane_mut().move_cursor(page),
      KeyCode::PageUp => self.pane_mut().move_cursor(-page),
      KeyCode::Char('g') | KeyCode::Home => self.pane_mut().jump(false),
      KeyCode::Char('G') | KeyCode::End => self.pane_mut().jump(true),

      // Query
      KeyCode::Char('/') => {
        self.mode = Mode::Search;
        self.search_input = self.pane().search().to_string();
      }
      KeyCode::Char('s') => self.pane_mut().cycle_sort(),
      KeyCode::Char('S') => self.pane_mut().flip_sort(),
      KeyCode::Char('a') => self.pane_mut().toggle_archived(),
      KeyCode::Char('r') => {
        self.pane_mut().reload();
        self.status_msg = "Reloading…".into();
      }

      _ => {}
    }
    true
  }

  fn switch_tab(&mut self, step: usize) {
    self.active = (self.active + step) % self.panes.len();
    self.status_msg.clear();
  }

  /// Rows moved by PageUp/PageDown; one screenful once the list was drawn.
  fn page_step(&self) -> isize { isize::try_from(self.pane().viewport()).unwrap_or(1).max(1) }
}

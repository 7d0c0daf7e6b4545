//! TUI rendering: header tabs, the active list and the status bar.

pub mod item_list;

use chrono::Local;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Paragraph},
};

use crate::app::{App, Mode};

// ─── Root draw ────────────────────────────────────────────────────────────────

/// Main draw function called each frame. Records the list viewport height on
/// the active pane, so it takes the app mutably.
pub fn draw(f: &mut Frame, app: &mut App) {
  let area = f.area();

  // Vertical stack: header, body, status bar.
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // header
      Constraint::Min(0),    // body
      Constraint::Length(1), // status bar
    ])
    .split(area);

  draw_header(f, rows[0], app);
  item_list::draw(f, rows[1], app);
  draw_status(f, rows[2], app);
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
  let date = Local::now().format("%Y-%m-%d").to_string();

  let mut spans = vec![Span::styled(
    " spool ",
    Style::default()
      .fg(Color::White)
      .add_modifier(Modifier::BOLD),
  )];
  for (i, pane) in app.panes.iter().enumerate() {
    let label = match pane.total() {
      Some(total) => format!(" {} ({total}) ", pane.resource().title),
      None => format!(" {} ", pane.resource().title),
    };
    let style = if i == app.active {
      Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
    } else {
      Style::default().fg(Color::White)
    };
    spans.push(Span::styled(label, style));
  }

  // Pad the middle so the date sits on the right.
  let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
  let right = format!("{date} ");
  let pad = usize::from(area.width)
    .saturating_sub(used)
    .saturating_sub(right.len());
  spans.push(Span::raw(" ".repeat(pad)));
  spans.push(Span::styled(right, Style::default().fg(Color::Gray)));

  let block = Block::default().style(Style::default().bg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);
  f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
  let pane = app.pane();
  let (mode_label, status) = match app.mode {
    Mode::Search => ("SEARCH", format!("/{}_  Enter apply  Esc cancel", app.search_input)),
    Mode::Browse if !app.status_msg.is_empty() => ("NORMAL", app.status_msg.clone()),
    Mode::Browse => {
      let mut hints = String::from("Tab view  jk move  / search  s/S sort  r reload");
      if pane.resource().archivable {
        hints.push_str("  a archived");
      }
      hints.push_str("  q quit");
      ("NORMAL", hints)
    }
  };

  let mut info = format!("sort {}", pane.sort_label());
  if !pane.search().is_empty() {
    info.push_str(&format!("  filter \"{}\"", pane.search()));
  }
  if pane.show_archived() {
    info.push_str("  +archived");
  }
  if pane.is_busy() {
    info.push_str("  loading…");
  }

  let line = Line::from(vec![
    Span::styled(
      format!(" {mode_label} "),
      Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD),
    ),
    Span::styled(format!("  {status}"), Style::default().fg(Color::Gray)),
    Span::styled(format!("  [{info}]"), Style::default().fg(Color::DarkGray)),
  ]);
  f.render_widget(
    Paragraph::new(line).style(Style::default().bg(Color::Black)),
    area,
  );
}

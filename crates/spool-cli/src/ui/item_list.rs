//! The active tab's record table.
//!
//! Only the rows inside the viewport are materialized as table cells; the
//! pane's offset decides which ones.

use ratatui::{
  Frame,
  layout::{Constraint, Rect},
  style::{Color, Modifier, Style},
  text::Line,
  widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};

use crate::app::App;

/// Render the active pane's table into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &mut App) {
  let pane = app.pane_mut();

  let title = match pane.total() {
    Some(total) => format!(" {} ({}/{total}) ", pane.resource().title, pane.len()),
    None => format!(" {} ", pane.resource().title),
  };
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);

  // One line for the column header, one reserved for the footer.
  let viewport = usize::from(inner.height.saturating_sub(2));
  pane.set_viewport(viewport);

  let header = Row::new(pane.columns().iter().map(|c| Cell::from(*c))).style(
    Style::default()
      .fg(Color::Yellow)
      .add_modifier(Modifier::BOLD),
  );
  let rows: Vec<Row> = pane
    .rows(pane.offset(), viewport)
    .into_iter()
    .map(Row::new)
    .collect();
  let widths: Vec<Constraint> = pane
    .widths()
    .iter()
    .map(|w| Constraint::Percentage(*w))
    .collect();

  let mut state = TableState::default();
  state.select(if rows.is_empty() {
    None
  } else {
    Some(pane.cursor() - pane.offset())
  });

  let table_area = Rect {
    height: inner.height.saturating_sub(1),
    ..inner
  };
  f.render_stateful_widget(
    Table::new(rows, widths).header(header).row_highlight_style(
      Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD),
    ),
    table_area,
    &mut state,
  );

  // Footer: fetch state of the list.
  if inner.height > 0 {
    let footer_area = Rect {
      y: inner.y + inner.height - 1,
      height: 1,
      ..inner
    };
    let (text, color) = if let Some(err) = pane.last_error() {
      (format!("{err}  (scroll or r to retry)"), Color::Red)
    } else if pane.is_busy() {
      ("Loading…".to_string(), Color::DarkGray)
    } else if pane.has_more() {
      ("More below".to_string(), Color::DarkGray)
    } else if pane.len() == 0 {
      ("No records".to_string(), Color::DarkGray)
    } else {
      ("End of list".to_string(), Color::DarkGray)
    };
    f.render_widget(
      Paragraph::new(Line::from(text)).style(Style::default().fg(color)),
      footer_area,
    );
  }
}

//! Mapping raw records into the shape a view renders.

use tracing::warn;

use crate::{error::ProjectionError, fetch::Page, record::Record};

/// Pure, deterministic mapping from a raw record to its view shape, e.g.
/// flattening a nested reference into a display field.
pub trait RecordProjector: Send + Sync + 'static {
  type Raw;
  type Output: Record;

  fn project(&self, raw: &Self::Raw) -> Result<Self::Output, ProjectionError>;
}

/// A page after projection.
///
/// Records that failed to project are dropped and counted in `skipped`, so
/// pagination accounting still lines up with the server's `total`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPage<R> {
  pub records: Vec<R>,
  pub skipped: usize,
  pub total:   u64,
}

impl<R> ProjectedPage<R> {
  pub fn new(records: Vec<R>, total: u64) -> Self {
    Self {
      records,
      skipped: 0,
      total,
    }
  }
}

/// Project every record of `page`, skipping (and logging) malformed ones.
pub fn project_page<P>(projector: &P, page: &Page<P::Raw>) -> ProjectedPage<P::Output>
where
  P: RecordProjector + ?Sized,
{
  let mut records = Vec::with_capacity(page.records.len());
  let mut skipped = 0;
  for raw in &page.records {
    match projector.project(raw) {
      Ok(record) => records.push(record),
      Err(e) => {
        warn!("skipping record that failed to project: {e}");
        skipped += 1;
      }
    }
  }
  ProjectedPage {
    records,
    skipped,
    total: page.total,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Row(u32);

  impl Record for Row {
    type Id = u32;

    fn id(&self) -> u32 { self.0 }
  }

  struct Parse;

  impl RecordProjector for Parse {
    type Raw = &'static str;
    type Output = Row;

    fn project(&self, raw: &&'static str) -> Result<Row, ProjectionError> {
      raw
        .parse()
        .map(Row)
        .map_err(|_| ProjectionError::Malformed(raw.to_string()))
    }
  }

  #[test]
  fn malformed_records_are_skipped_and_counted() {
    let page = Page {
      records: vec!["1", "two", "3"],
      total:   10,
    };
    let projected = project_page(&Parse, &page);
    assert_eq!(projected.records, vec![Row(1), Row(3)]);
    assert_eq!(projected.skipped, 1);
    assert_eq!(projected.total, 10, "total comes from the server");
  }
}

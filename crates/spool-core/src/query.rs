//! Filter, sort and page-size parameters of a list view.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─── Filter ──────────────────────────────────────────────────────────────────

/// One filter condition. Multiple `values` are OR-ed together; multiple
/// conditions are AND-ed. Matching semantics belong to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
  pub field:  String,
  pub values: Vec<String>,
}

impl Condition {
  pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      field:  field.into(),
      values: vec![value.into()],
    }
  }

  pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Into<String>,
  {
    Self {
      field:  field.into(),
      values: values.into_iter().map(Into::into).collect(),
    }
  }
}

// ─── Sort ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
  #[default]
  Asc,
  Desc,
}

impl SortDirection {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Asc => "asc",
      Self::Desc => "desc",
    }
  }

  pub fn flipped(self) -> Self {
    match self {
      Self::Asc => Self::Desc,
      Self::Desc => Self::Asc,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorter {
  pub field:     String,
  pub direction: SortDirection,
}

impl Sorter {
  pub fn asc(field: impl Into<String>) -> Self {
    Self {
      field:     field.into(),
      direction: SortDirection::Asc,
    }
  }

  pub fn desc(field: impl Into<String>) -> Self {
    Self {
      field:     field.into(),
      direction: SortDirection::Desc,
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// The view configuration that one epoch is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
  pub filter: Vec<Condition>,
  pub sorter: Vec<Sorter>,
  page_size:  u32,
}

impl ListQuery {
  /// Returns [`Error::ZeroPageSize`] if `page_size` is zero.
  pub fn new(page_size: u32) -> Result<Self> {
    if page_size == 0 {
      return Err(Error::ZeroPageSize);
    }
    Ok(Self {
      filter: Vec::new(),
      sorter: Vec::new(),
      page_size,
    })
  }

  pub fn with_filter(mut self, filter: Vec<Condition>) -> Self {
    self.filter = filter;
    self
  }

  pub fn with_sorter(mut self, sorter: Vec<Sorter>) -> Self {
    self.sorter = sorter;
    self
  }

  pub fn page_size(&self) -> u32 { self.page_size }

  pub fn set_page_size(&mut self, page_size: u32) -> Result<()> {
    if page_size == 0 {
      return Err(Error::ZeroPageSize);
    }
    self.page_size = page_size;
    Ok(())
  }
}

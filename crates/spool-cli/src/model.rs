//! Inventory entities as served by the API, and their list-row projections.
//!
//! The raw shapes nest their references (a spool embeds its filament, which
//! embeds its vendor). Rows flatten those references into display fields so
//! a list view never has to look anything up.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use spool_core::{ProjectionError, Record, RecordProjector};

// ─── Raw entities ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Vendor {
  pub id:          i64,
  pub name:        String,
  #[serde(default)]
  pub external_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Filament {
  pub id:        i64,
  #[serde(default)]
  pub name:      Option<String>,
  #[serde(default)]
  pub material:  Option<String>,
  #[serde(default)]
  pub vendor:    Option<Vendor>,
  #[serde(default)]
  pub color_hex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Spool {
  pub id:               i64,
  pub filament:         Filament,
  #[serde(default)]
  pub remaining_weight: Option<f64>,
  #[serde(default)]
  pub location:         Option<String>,
  #[serde(default)]
  pub lot_nr:           Option<String>,
  #[serde(default)]
  pub archived:         bool,
  /// User-defined extra fields. Values are JSON-encoded strings.
  #[serde(default)]
  pub extra:            HashMap<String, String>,
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

/// A row that can be rendered as table cells.
pub trait Tabular: Record {
  const COLUMNS: &'static [&'static str];
  /// Relative column widths, one per column.
  const WIDTHS: &'static [u16];

  fn cells(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VendorRow {
  pub id:          i64,
  pub name:        String,
  pub external_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilamentRow {
  pub id:        i64,
  pub vendor:    String,
  pub name:      String,
  pub material:  String,
  pub color_hex: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpoolRow {
  pub id:               i64,
  /// `Vendor - Name`, or whichever of the two is known.
  pub filament:         String,
  pub material:         String,
  pub remaining_weight: Option<f64>,
  pub location:         String,
  pub lot_nr:           String,
  pub nfc_id:           Option<String>,
  pub archived:         bool,
}

macro_rules! record_by_id {
  ($($row:ty),*) => {
    $(impl Record for $row {
      type Id = i64;

      fn id(&self) -> i64 { self.id }
    })*
  };
}

record_by_id!(VendorRow, FilamentRow, SpoolRow);

impl Tabular for VendorRow {
  const COLUMNS: &'static [&'static str] = &["ID", "Name", "External ID"];
  const WIDTHS: &'static [u16] = &[8, 60, 32];

  fn cells(&self) -> Vec<String> {
    vec![self.id.to_string(), self.name.clone(), self.external_id.clone()]
  }
}

impl Tabular for FilamentRow {
  const COLUMNS: &'static [&'static str] = &["ID", "Vendor", "Name", "Material", "Color"];
  const WIDTHS: &'static [u16] = &[8, 25, 37, 15, 15];

  fn cells(&self) -> Vec<String> {
    vec![
      self.id.to_string(),
      self.vendor.clone(),
      self.name.clone(),
      self.material.clone(),
      self.color_hex.clone(),
    ]
  }
}

impl Tabular for SpoolRow {
  const COLUMNS: &'static [&'static str] =
    &["ID", "Filament", "Material", "Remaining", "Location", "Lot", "NFC"];
  const WIDTHS: &'static [u16] = &[6, 32, 10, 12, 16, 12, 12];

  fn cells(&self) -> Vec<String> {
    let mut id = self.id.to_string();
    if self.archived {
      id.push('*');
    }
    vec![
      id,
      self.filament.clone(),
      self.material.clone(),
      self
        .remaining_weight
        .map(|w| format!("{w:.0} g"))
        .unwrap_or_default(),
      self.location.clone(),
      self.lot_nr.clone(),
      self.nfc_id.clone().unwrap_or_default(),
    ]
  }
}

// ─── Projectors ───────────────────────────────────────────────────────────────

/// Display name of a filament: `Vendor - Name`.
fn filament_display(filament: &Filament) -> String {
  let vendor = filament.vendor.as_ref().map(|v| v.name.as_str());
  match (vendor, filament.name.as_deref()) {
    (Some(v), Some(n)) => format!("{v} - {n}"),
    (Some(v), None) => v.to_string(),
    (None, Some(n)) => n.to_string(),
    (None, None) => format!("Filament #{}", filament.id),
  }
}

/// Decode a JSON-encoded extra field value, falling back to the raw text.
fn extra_text(raw: &str) -> String {
  match serde_json::from_str::<Value>(raw) {
    Ok(Value::String(s)) => s,
    Ok(other) => other.to_string(),
    Err(_) => raw.to_string(),
  }
}

pub struct VendorProjector;

impl RecordProjector for VendorProjector {
  type Raw = Value;
  type Output = VendorRow;

  fn project(&self, raw: &Value) -> Result<VendorRow, ProjectionError> {
    let vendor = Vendor::deserialize(raw)?;
    Ok(VendorRow {
      id:          vendor.id,
      name:        vendor.name,
      external_id: vendor.external_id.unwrap_or_default(),
    })
  }
}

pub struct FilamentProjector;

impl RecordProjector for FilamentProjector {
  type Raw = Value;
  type Output = FilamentRow;

  fn project(&self, raw: &Value) -> Result<FilamentRow, ProjectionError> {
    let filament = Filament::deserialize(raw)?;
    Ok(FilamentRow {
      id:        filament.id,
      vendor:    filament
        .vendor
        .as_ref()
        .map(|v| v.name.clone())
        .unwrap_or_default(),
      name:      filament.name.clone().unwrap_or_default(),
      material:  filament.material.clone().unwrap_or_default(),
      color_hex: filament
        .color_hex
        .as_ref()
        .map(|c| format!("#{}", c.trim_start_matches('#')))
        .unwrap_or_default(),
    })
  }
}

pub struct SpoolProjector;

impl RecordProjector for SpoolProjector {
  type Raw = Value;
  type Output = SpoolRow;

  fn project(&self, raw: &Value) -> Result<SpoolRow, ProjectionError> {
    let spool = Spool::deserialize(raw)?;
    Ok(SpoolRow {
      id:               spool.id,
      filament:         filament_display(&spool.filament),
      material:         spool.filament.material.clone().unwrap_or_default(),
      remaining_weight: spool.remaining_weight,
      location:         spool.location.unwrap_or_default(),
      lot_nr:           spool.lot_nr.unwrap_or_default(),
      nfc_id:           spool.extra.get("nfc_id").map(|raw| extra_text(raw)),
      archived:         spool.archived,
    })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn spool_json() -> Value {
    json!({
      "id": 12,
      "registered": "2024-03-01T10:00:00Z",
      "filament": {
        "id": 4,
        "name": "Galaxy Black",
        "material": "PLA",
        "color_hex": "1a1a1a",
        "vendor": { "id": 2, "name": "Prusament" }
      },
      "remaining_weight": 642.4,
      "location": "Shelf A",
      "archived": false,
      "extra": { "nfc_id": "\"04A224B2C35E80\"" }
    })
  }

  #[test]
  fn spool_flattens_filament_and_vendor() {
    let row = SpoolProjector.project(&spool_json()).unwrap();
    assert_eq!(row.id, 12);
    assert_eq!(row.filament, "Prusament - Galaxy Black");
    assert_eq!(row.material, "PLA");
    assert_eq!(row.remaining_weight, Some(642.4));
    assert_eq!(row.location, "Shelf A");
    assert_eq!(row.lot_nr, "");
    assert_eq!(row.nfc_id.as_deref(), Some("04A224B2C35E80"));
    assert!(!row.archived);
  }

  #[test]
  fn projection_is_deterministic() {
    let raw = spool_json();
    assert_eq!(
      SpoolProjector.project(&raw).unwrap(),
      SpoolProjector.project(&raw).unwrap()
    );
  }

  #[test]
  fn spool_without_filament_is_malformed() {
    let err = SpoolProjector.project(&json!({ "id": 1 })).unwrap_err();
    assert!(matches!(err, ProjectionError::Json(_)));
  }

  #[test]
  fn filament_without_vendor() {
    let row = FilamentProjector
      .project(&json!({ "id": 3, "name": "Basic", "material": "PETG", "color_hex": "#ff0000" }))
      .unwrap();
    assert_eq!(row.vendor, "");
    assert_eq!(row.color_hex, "#ff0000");
    assert_eq!(row.cells().len(), FilamentRow::COLUMNS.len());
  }

  #[test]
  fn filament_display_falls_back() {
    let bare = Filament {
      id:        9,
      name:      None,
      material:  None,
      vendor:    None,
      color_hex: None,
    };
    assert_eq!(filament_display(&bare), "Filament #9");
  }

  #[test]
  fn vendor_row_cells() {
    let row = VendorProjector
      .project(&json!({ "id": 2, "name": "Prusament", "external_id": "prusa" }))
      .unwrap();
    assert_eq!(row.cells(), vec!["2", "Prusament", "prusa"]);
    assert_eq!(VendorRow::WIDTHS.len(), VendorRow::COLUMNS.len());
  }

  #[test]
  fn archived_spool_is_marked() {
    let mut raw = spool_json();
    raw["archived"] = json!(true);
    let row = SpoolProjector.project(&raw).unwrap();
    assert_eq!(row.cells()[0], "12*");
    assert_eq!(row.cells()[3], "642 g");
  }

  #[test]
  fn non_string_extra_value_is_kept() {
    assert_eq!(extra_text("42"), "42");
    assert_eq!(extra_text("not json"), "not json");
  }
}

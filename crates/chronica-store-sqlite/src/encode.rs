//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Statuses are stored as
//! their lowercase variant names. Extension cells travel as
//! [`rusqlite::types::Value`].

use chrono::{DateTime, Utc};
use chronica_core::{
  entity::{Entity, Value},
  import::ImportStatus,
  resolution::{Link, RealEntity, Status},
};
use rusqlite::{Row, types::Value as SqlValue};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Status ──────────────────────────────────────────────────────────────────

pub fn encode_status(s: Status) -> String { s.to_string() }

pub fn decode_status(s: &str) -> Result<Status> { Ok(Status::parse(s)?) }

// ─── Cell values ─────────────────────────────────────────────────────────────

pub fn to_sql(v: &Value) -> SqlValue {
  match v {
    Value::Null => SqlValue::Null,
    Value::Integer(i) => SqlValue::Integer(*i),
    Value::Real(r) => SqlValue::Real(*r),
    Value::Text(s) => SqlValue::Text(s.clone()),
  }
}

pub fn from_sql(v: SqlValue) -> Value {
  match v {
    SqlValue::Null => Value::Null,
    SqlValue::Integer(i) => Value::Integer(i),
    SqlValue::Real(r) => Value::Real(r),
    SqlValue::Text(s) => Value::Text(s),
    SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawEntity::from_row`].
pub const ENTITY_COLUMNS: &str = "id, category, container_id, entity_order, nesting_level, \
                                  source_line, group_name, updated_at, indexed_at";

/// Raw values read directly from an `entities` row.
pub struct RawEntity {
  pub id:            String,
  pub category:      String,
  pub container_id:  Option<String>,
  pub order:         i64,
  pub nesting_level: i64,
  pub source_line:   i64,
  pub group_name:    Option<String>,
  pub updated_at:    Option<String>,
  pub indexed_at:    Option<String>,
}

impl RawEntity {
  /// Read from a row selected with [`ENTITY_COLUMNS`], starting at column 0.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      category:      row.get(1)?,
      container_id:  row.get(2)?,
      order:         row.get(3)?,
      nesting_level: row.get(4)?,
      source_line:   row.get(5)?,
      group_name:    row.get(6)?,
      updated_at:    row.get(7)?,
      indexed_at:    row.get(8)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      id:            self.id,
      category:      self.category,
      container_id:  self.container_id,
      order:         self.order,
      nesting_level: self.nesting_level,
      source_line:   self.source_line,
      group_name:    self.group_name,
      updated_at:    decode_opt_dt(self.updated_at.as_deref())?,
      indexed_at:    decode_opt_dt(self.indexed_at.as_deref())?,
    })
  }
}

/// Raw values of a `real_entities` row joined with its base row.
pub struct RawRealEntity {
  pub id:           String,
  pub owner_user:   String,
  pub description:  Option<String>,
  pub status:       String,
  pub occ_category: String,
  pub obs:          Option<String>,
  pub updated_at:   Option<String>,
}

impl RawRealEntity {
  pub const SELECT: &'static str = "SELECT r.id, r.owner_user, r.description, r.status, \
                                    r.occ_category, r.obs, e.updated_at \
                                    FROM real_entities r JOIN entities e ON e.id = r.id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      owner_user:   row.get(1)?,
      description:  row.get(2)?,
      status:       row.get(3)?,
      occ_category: row.get(4)?,
      obs:          row.get(5)?,
      updated_at:   row.get(6)?,
    })
  }

  pub fn into_real_entity(self) -> Result<RealEntity> {
    Ok(RealEntity {
      id:           self.id,
      owner_user:   self.owner_user,
      description:  self.description,
      status:       decode_status(&self.status)?,
      occ_category: self.occ_category,
      obs:          self.obs,
      updated_at:   decode_opt_dt(self.updated_at.as_deref())?,
    })
  }
}

/// Raw values of a `links` row.
pub struct RawLink {
  pub real_entity_id: String,
  pub occurrence_id:  String,
  pub owner_user:     String,
  pub rule:           Option<String>,
  pub status:         String,
}

impl RawLink {
  pub const SELECT: &'static str =
    "SELECT real_entity_id, occurrence_id, owner_user, rule, status FROM links";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      real_entity_id: row.get(0)?,
      occurrence_id:  row.get(1)?,
      owner_user:     row.get(2)?,
      rule:           row.get(3)?,
      status:         row.get(4)?,
    })
  }

  pub fn into_link(self) -> Result<Link> {
    Ok(Link {
      real_entity_id: self.real_entity_id,
      occurrence_id:  self.occurrence_id,
      rule:           self.rule,
      owner_user:     self.owner_user,
      status:         decode_status(&self.status)?,
    })
  }
}

/// Raw values of an `import_status` row.
pub struct RawImportStatus {
  pub path:           String,
  pub name:           String,
  pub structure:      String,
  pub translator:     String,
  pub translated_at:  Option<String>,
  pub error_count:    i64,
  pub warning_count:  i64,
  pub error_report:   String,
  pub warning_report: String,
  pub imported_at:    Option<String>,
}

impl RawImportStatus {
  pub const SELECT: &'static str = "SELECT path, name, structure, translator, translated_at, \
                                    error_count, warning_count, error_report, warning_report, \
                                    imported_at FROM import_status";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      path:           row.get(0)?,
      name:           row.get(1)?,
      structure:      row.get(2)?,
      translator:     row.get(3)?,
      translated_at:  row.get(4)?,
      error_count:    row.get(5)?,
      warning_count:  row.get(6)?,
      error_report:   row.get(7)?,
      warning_report: row.get(8)?,
      imported_at:    row.get(9)?,
    })
  }

  pub fn into_status(self) -> Result<ImportStatus> {
    Ok(ImportStatus {
      path:           self.path,
      name:           self.name,
      structure:      self.structure,
      translator:     self.translator,
      translated_at:  decode_opt_dt(self.translated_at.as_deref())?,
      error_count:    usize::try_from(self.error_count).unwrap_or_default(),
      warning_count:  usize::try_from(self.warning_count).unwrap_or_default(),
      error_report:   self.error_report,
      warning_report: self.warning_report,
      imported_at:    decode_opt_dt(self.imported_at.as_deref())?,
    })
  }
}

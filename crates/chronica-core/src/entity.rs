//! The entity model: one base record per transcribed group, extended by
//! per-category side tables.
//!
//! Every stored thing (occurrences, relations, class descriptors, real
//! entities) is an [`Entity`] and shares one global id namespace. Category
//! specific columns are carried in a schema-less [`Row`] and validated
//! against the category's class descriptor when read or written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Base record ─────────────────────────────────────────────────────────────

/// The base row shared by every category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub id:            String,
  /// Discriminator selecting the extension tables for this row.
  pub category:      String,
  /// Parent entity in the strict containment tree.
  pub container_id:  Option<String>,
  pub order:         i64,
  pub nesting_level: i64,
  /// Line of the original transcription that produced this row.
  pub source_line:   i64,
  /// Literal notation group name.
  pub group_name:    Option<String>,
  pub updated_at:    Option<DateTime<Utc>>,
  pub indexed_at:    Option<DateTime<Utc>>,
}

impl Entity {
  /// A base row with no position information, as created outside ingestion.
  pub fn detached(id: impl Into<String>, category: impl Into<String>) -> Self {
    Self {
      id:            id.into(),
      category:      category.into(),
      container_id:  None,
      order:         0,
      nesting_level: 0,
      source_line:   0,
      group_name:    None,
      updated_at:    Some(Utc::now()),
      indexed_at:    None,
    }
  }
}

// ─── Generic row accessor ────────────────────────────────────────────────────

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  #[default]
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Integer(i) => Some(*i as f64),
      Self::Real(r) => Some(*r),
      _ => None,
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<f64> for Value {
  fn from(r: f64) -> Self { Self::Real(r) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

/// Column name → value mapping for the extension columns of one entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, column: &str) -> Option<&Value> { self.0.get(column) }

  pub fn text(&self, column: &str) -> Option<&str> {
    self.get(column).and_then(Value::as_str)
  }

  pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(column.into(), value.into());
  }

  pub fn contains(&self, column: &str) -> bool { self.0.contains_key(column) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> { self.0.iter() }
}

impl FromIterator<(String, Value)> for Row {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// A base row together with every extension column along its lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
  pub entity:     Entity,
  pub attributes: Row,
}

// ─── Typed views ─────────────────────────────────────────────────────────────

/// Typed view over a `relation` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
  pub id:             String,
  pub origin_id:      String,
  /// `None` once the destination has been deleted without restoration.
  pub destination_id: Option<String>,
  pub kind:           Option<String>,
  pub value:          Option<String>,
  pub date:           Option<String>,
  pub obs:            Option<String>,
}

impl Relation {
  /// Relation value marking an identity statement between two occurrences.
  pub const SAME_AS: &'static str = "same_as";
  /// Relation type used for identity statements.
  pub const IDENTIFICATION: &'static str = "identification";

  pub fn is_same_as(&self) -> bool {
    self.value.as_deref() == Some(Self::SAME_AS)
  }

  /// Build the typed view from a generic record, if it is a relation.
  ///
  /// Extension columns are looked up by the names used in the built-in
  /// `relations` table.
  pub fn from_record(record: &EntityRecord) -> Option<Self> {
    let attrs = &record.attributes;
    let origin_id = attrs.text("origin")?.to_owned();
    let text = |col: &str| attrs.text(col).map(str::to_owned);
    Some(Self {
      id: record.entity.id.clone(),
      origin_id,
      destination_id: text("destination"),
      kind: text("rel_type"),
      value: text("rel_value"),
      date: text("rel_date"),
      obs: text("obs"),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relation_view_reads_builtin_columns() {
    let mut attributes = Row::new();
    attributes.set("origin", "p1");
    attributes.set("destination", Value::Null);
    attributes.set("rel_type", Relation::IDENTIFICATION);
    attributes.set("rel_value", Relation::SAME_AS);

    let record = EntityRecord {
      entity: Entity::detached("r1", "relation"),
      attributes,
    };
    let relation = Relation::from_record(&record).unwrap();
    assert_eq!(relation.origin_id, "p1");
    assert!(relation.destination_id.is_none());
    assert!(relation.is_same_as());
  }

  #[test]
  fn non_relation_record_has_no_view() {
    let record = EntityRecord {
      entity:     Entity::detached("p1", "person"),
      attributes: Row::new(),
    };
    assert!(Relation::from_record(&record).is_none());
  }

  #[test]
  fn option_values_become_null() {
    let v: Value = Option::<String>::None.into();
    assert!(v.is_null());
    assert_eq!(Value::from(Some(3_i64)).as_f64(), Some(3.0));
  }
}

//! Class descriptors: the in-transcription definition of a record category,
//! its backing table and its columns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

// ─── Well-known categories ───────────────────────────────────────────────────

/// Root of every class hierarchy; backs the base `entities` table.
pub const ENTITY: &str = "entity";
/// Category of persisted class descriptors.
pub const CLASS: &str = "class";
pub const RELATION: &str = "relation";
pub const ATTRIBUTE: &str = "attribute";
pub const SOURCE: &str = "source";
pub const ACT: &str = "act";
pub const PERSON: &str = "person";
pub const OBJECT: &str = "object";
pub const GEOENTITY: &str = "geoentity";
pub const REAL_ENTITY: &str = "rentity";

/// Categories whose mapping is fixed by the store and never redefined by a
/// transcription.
pub const PROTECTED: &[&str] = &[
  ENTITY,
  CLASS,
  RELATION,
  ATTRIBUTE,
  SOURCE,
  ACT,
  PERSON,
  OBJECT,
  GEOENTITY,
  REAL_ENTITY,
];

pub fn is_protected(category: &str) -> bool { PROTECTED.contains(&category) }

// ─── Column types ────────────────────────────────────────────────────────────

/// Declared column type as written in the transcription.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ColumnType {
  /// Text, bounded by `size` when non-zero.
  #[strum(to_string = "varchar", serialize = "char")]
  Varchar,
  /// Number; `precision` decides between integer and floating storage.
  #[strum(to_string = "numeric", serialize = "number")]
  Numeric,
  /// Unbounded text.
  #[strum(to_string = "text", serialize = "blob")]
  Text,
}

/// Concrete storage type chosen for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
  FixedText(u32),
  Text,
  Integer,
  Real,
}

impl StorageType {
  pub fn sql(self) -> String {
    match self {
      Self::FixedText(size) => format!("VARCHAR({size})"),
      Self::Text => "TEXT".to_owned(),
      Self::Integer => "INTEGER".to_owned(),
      Self::Real => "REAL".to_owned(),
    }
  }

  pub fn is_numeric(self) -> bool { matches!(self, Self::Integer | Self::Real) }
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// Header of a class definition: which category, which table, which group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapping {
  /// Category name; also the descriptor's entity id.
  pub id:          String,
  pub table_name:  String,
  /// Notation group this category is produced from.
  pub group_name:  String,
  /// Single parent category; `None` marks a hierarchy root.
  pub super_class: Option<String>,
}

/// One column of a class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
  /// Element name in the notation.
  pub name:             String,
  pub column_name:      String,
  /// Semantic role; matched against the `class` of incoming elements.
  pub column_class:     String,
  pub column_type:      ColumnType,
  #[serde(default)]
  pub size:             u32,
  #[serde(default)]
  pub precision:        u32,
  /// `0` when not part of the key, otherwise the ordinal position in the
  /// table's composite key.
  #[serde(default)]
  pub primary_key_rank: u32,
}

impl ColumnDescriptor {
  /// A text column whose element name, column name and class coincide.
  pub fn text(name: &str, size: u32) -> Self {
    Self {
      name:             name.to_owned(),
      column_name:      name.to_owned(),
      column_class:     name.to_owned(),
      column_type:      ColumnType::Varchar,
      size,
      precision:        0,
      primary_key_rank: 0,
    }
  }

  /// The conventional `id` key column.
  pub fn key() -> Self {
    Self { primary_key_rank: 1, ..Self::text("id", 64) }
  }

  pub fn with_column(mut self, column_name: &str) -> Self {
    self.column_name = column_name.to_owned();
    self
  }

  pub fn with_class(mut self, column_class: &str) -> Self {
    self.column_class = column_class.to_owned();
    self
  }

  pub fn numeric(mut self, size: u32, precision: u32) -> Self {
    self.column_type = ColumnType::Numeric;
    self.size = size;
    self.precision = precision;
    self
  }

  pub fn is_key(&self) -> bool { self.primary_key_rank > 0 }

  /// Map the declared type onto a storage type.
  pub fn storage_type(&self) -> StorageType {
    match self.column_type {
      ColumnType::Varchar if self.size > 0 => StorageType::FixedText(self.size),
      ColumnType::Varchar | ColumnType::Text => StorageType::Text,
      ColumnType::Numeric if self.precision == 0 => StorageType::Integer,
      ColumnType::Numeric => StorageType::Real,
    }
  }
}

/// A complete class definition as delivered by the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
  pub mapping: ClassMapping,
  pub columns: Vec<ColumnDescriptor>,
}

impl ClassDescriptor {
  pub fn new(mapping: ClassMapping, columns: Vec<ColumnDescriptor>) -> Self {
    Self { mapping, columns }
  }

  pub fn category(&self) -> &str { &self.mapping.id }

  pub fn is_root(&self) -> bool { self.mapping.super_class.is_none() }

  /// Key columns ordered by their rank.
  pub fn key_columns(&self) -> Vec<&ColumnDescriptor> {
    let mut keys: Vec<_> = self.columns.iter().filter(|c| c.is_key()).collect();
    keys.sort_by_key(|c| c.primary_key_rank);
    keys
  }

  /// Check internal consistency: names present, no duplicated columns, no
  /// duplicated key ranks, no self-inheritance.
  pub fn validate(&self) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidDescriptor {
      class:  self.mapping.id.clone(),
      reason: reason.to_owned(),
    };

    if self.mapping.id.is_empty() {
      return Err(invalid("empty category id"));
    }
    if self.mapping.table_name.is_empty() {
      return Err(invalid("empty table name"));
    }
    if self.mapping.super_class.as_deref() == Some(self.mapping.id.as_str()) {
      return Err(invalid("class cannot extend itself"));
    }

    let mut columns = HashSet::new();
    let mut ranks = HashSet::new();
    for column in &self.columns {
      if !columns.insert(column.column_name.to_ascii_lowercase()) {
        return Err(invalid(&format!(
          "column {:?} declared twice",
          column.column_name
        )));
      }
      if column.is_key() && !ranks.insert(column.primary_key_rank) {
        return Err(invalid(&format!(
          "key rank {} used twice",
          column.primary_key_rank
        )));
      }
    }
    Ok(())
  }
}

/// A class descriptor bound to a physical table and placed in its hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedClass {
  pub descriptor:    ClassDescriptor,
  /// Categories from the hierarchy root down to this class, inclusive.
  pub lineage:       Vec<String>,
  /// Column names physically present in the backing table.
  pub table_columns: Vec<String>,
}

impl ResolvedClass {
  pub fn category(&self) -> &str { self.descriptor.category() }

  pub fn table(&self) -> &str { &self.descriptor.mapping.table_name }

  pub fn super_class(&self) -> Option<&str> {
    self.descriptor.mapping.super_class.as_deref()
  }

  /// Whether this class is `category` or inherits from it.
  pub fn is_a(&self, category: &str) -> bool {
    self.lineage.iter().any(|c| c == category)
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  fn mapping(id: &str, super_class: Option<&str>) -> ClassMapping {
    ClassMapping {
      id:          id.into(),
      table_name:  format!("{id}s"),
      group_name:  id.into(),
      super_class: super_class.map(Into::into),
    }
  }

  #[test]
  fn storage_types_follow_size_and_precision() {
    assert_eq!(ColumnDescriptor::text("name", 32).storage_type(), StorageType::FixedText(32));
    assert_eq!(ColumnDescriptor::text("obs", 0).storage_type(), StorageType::Text);
    assert_eq!(
      ColumnDescriptor::text("age", 0).numeric(3, 0).storage_type(),
      StorageType::Integer
    );
    assert_eq!(
      ColumnDescriptor::text("value", 0).numeric(10, 2).storage_type(),
      StorageType::Real
    );
    assert_eq!(StorageType::FixedText(8).sql(), "VARCHAR(8)");
  }

  #[test]
  fn column_type_parses_aliases() {
    assert_eq!(ColumnType::from_str("CHAR").unwrap(), ColumnType::Varchar);
    assert_eq!(ColumnType::from_str("number").unwrap(), ColumnType::Numeric);
    assert_eq!(ColumnType::Text.to_string(), "text");
  }

  #[test]
  fn key_columns_are_ordered_by_rank() {
    let mut second = ColumnDescriptor::text("seq", 0).numeric(4, 0);
    second.primary_key_rank = 2;
    let descriptor = ClassDescriptor::new(
      mapping("line", Some("entity")),
      vec![second, ColumnDescriptor::text("note", 0), ColumnDescriptor::key()],
    );
    let keys: Vec<_> = descriptor
      .key_columns()
      .into_iter()
      .map(|c| c.column_name.as_str())
      .collect();
    assert_eq!(keys, ["id", "seq"]);
  }

  #[test]
  fn validate_rejects_duplicate_columns() {
    let descriptor = ClassDescriptor::new(
      mapping("n", Some("person")),
      vec![ColumnDescriptor::text("name", 0), ColumnDescriptor::text("NAME", 0)],
    );
    assert!(matches!(
      descriptor.validate(),
      Err(Error::InvalidDescriptor { .. })
    ));
  }

  #[test]
  fn validate_rejects_self_inheritance() {
    let descriptor = ClassDescriptor::new(mapping("n", Some("n")), vec![]);
    assert!(descriptor.validate().is_err());
  }

  #[test]
  fn resolved_class_knows_its_ancestry() {
    let resolved = ResolvedClass {
      descriptor:    ClassDescriptor::new(mapping("n", Some(PERSON)), vec![]),
      lineage:       vec![ENTITY.into(), PERSON.into(), "n".into()],
      table_columns: vec!["id".into(), "name".into()],
    };
    assert!(resolved.is_a(PERSON));
    assert!(!resolved.is_a(SOURCE));
    assert_eq!(resolved.table(), "ns");
  }

  #[test]
  fn builtins_are_protected() {
    assert!(is_protected(PERSON));
    assert!(!is_protected("lugar"));
  }
}

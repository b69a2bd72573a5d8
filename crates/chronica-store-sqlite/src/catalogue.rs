//! Descriptors for the built-in categories whose tables live in
//! [`crate::schema::SCHEMA`].
//!
//! They are persisted at startup like any transcription-supplied class so
//! that group resolution and introspection treat both alike.

use chronica_core::class::{
  self, ClassDescriptor, ClassMapping, ColumnDescriptor,
};

fn mapping(id: &str, table: &str, super_class: Option<&str>) -> ClassMapping {
  ClassMapping {
    id:          id.to_owned(),
    table_name:  table.to_owned(),
    group_name:  id.to_owned(),
    super_class: super_class.map(str::to_owned),
  }
}

fn col(name: &str, size: u32) -> ColumnDescriptor { ColumnDescriptor::text(name, size) }

/// A column whose element name and class differ from its column name.
fn renamed(name: &str, column: &str, size: u32) -> ColumnDescriptor {
  ColumnDescriptor::text(name, size).with_column(column)
}

fn extension(id: &str, table: &str, columns: Vec<ColumnDescriptor>) -> ClassDescriptor {
  let mut all = vec![ColumnDescriptor::key()];
  all.extend(columns);
  ClassDescriptor::new(mapping(id, table, Some(class::ENTITY)), all)
}

/// Built-in descriptors, root first.
pub fn builtin() -> Vec<ClassDescriptor> {
  vec![
    ClassDescriptor::new(mapping(class::ENTITY, "entities", None), vec![
      ColumnDescriptor::key(),
      renamed("class", "category", 64),
      renamed("inside", "container_id", 64),
      renamed("order", "entity_order", 0).numeric(10, 0),
      renamed("level", "nesting_level", 0).numeric(10, 0),
      renamed("line", "source_line", 0).numeric(10, 0),
      renamed("groupname", "group_name", 32),
      col("updated_at", 0),
      col("indexed_at", 0),
    ]),
    extension(class::CLASS, "classes", vec![
      col("table_name", 64),
      col("group_name", 32),
      col("super_class", 64),
    ]),
    extension(class::RELATION, "relations", vec![
      col("origin", 64),
      col("destination", 64),
      renamed("type", "rel_type", 32),
      renamed("value", "rel_value", 64),
      renamed("date", "rel_date", 24),
      col("obs", 0),
    ]),
    extension(class::ATTRIBUTE, "attributes", vec![
      col("entity", 64),
      renamed("type", "attr_type", 512),
      renamed("value", "attr_value", 1024),
      renamed("date", "attr_date", 24),
      col("obs", 0),
    ]),
    extension(class::SOURCE, "sources", vec![
      renamed("type", "source_type", 32),
      renamed("date", "source_date", 24),
      col("loc", 64),
      col("ref", 64),
      renamed("file", "source_file", 256),
      renamed("replace", "replace_mode", 24),
      col("obs", 0),
    ]),
    extension(class::ACT, "acts", vec![
      renamed("type", "act_type", 32),
      renamed("date", "act_date", 24),
      col("loc", 64),
      col("ref", 64),
      col("obs", 0),
    ]),
    extension(class::PERSON, "persons", vec![
      col("name", 128),
      col("sex", 1),
      col("obs", 0),
    ]),
    extension(class::OBJECT, "objects", vec![
      col("name", 128),
      renamed("type", "object_type", 32),
      col("obs", 0),
    ]),
    extension(class::GEOENTITY, "geoentities", vec![
      col("name", 128),
      renamed("type", "geo_type", 32),
      col("obs", 0),
    ]),
    extension(class::REAL_ENTITY, "real_entities", vec![
      renamed("user", "owner_user", 32),
      col("description", 0),
      col("status", 16),
      col("occ_category", 64),
      col("obs", 0),
    ]),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_protected_category_has_a_builtin() {
    let builtin = builtin();
    for category in class::PROTECTED {
      assert!(
        builtin.iter().any(|d| d.category() == *category),
        "missing builtin {category}"
      );
    }
  }

  #[test]
  fn builtins_are_valid_and_rooted_at_entity() {
    for descriptor in builtin() {
      descriptor.validate().unwrap();
      if descriptor.category() != class::ENTITY {
        assert_eq!(descriptor.mapping.super_class.as_deref(), Some(class::ENTITY));
        assert_eq!(descriptor.key_columns().len(), 1);
      }
    }
  }
}

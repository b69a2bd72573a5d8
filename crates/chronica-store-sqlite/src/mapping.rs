//! Mapping of an assembled group onto the base row and the extension rows of
//! its category's lineage.

use std::sync::Arc;

use chrono::Utc;
use chronica_core::{
  class::{ColumnDescriptor, ResolvedClass, StorageType},
  entity::{Entity, Row, Value},
  ingest::Group,
};

use crate::{Error, Result, entities::key_column};

/// Element classes consumed by the base row.
const BASE_CLASSES: &[&str] = &["id", "inside"];

const OBS: &str = "obs";

const BASE_TABLE: &str = "entities";

/// Rows ready to insert for one group, in insertion order.
#[derive(Debug)]
pub struct MappedGroup {
  pub entity:   Entity,
  pub rows:     Vec<(Arc<ResolvedClass>, Row)>,
  /// Names of elements no column took.
  pub unmapped: Vec<String>,
}

impl MappedGroup {
  /// First value of `column` across the extension rows.
  pub fn text(&self, column: &str) -> Option<&str> {
    self.rows.iter().find_map(|(_, row)| row.text(column))
  }
}

/// Build the rows for `group` stored as `class`, whose resolved ancestors
/// (root first, `class` last) are given in `lineage`.
pub fn map_group(
  group: &Group,
  class: &ResolvedClass,
  lineage: &[Arc<ResolvedClass>],
) -> Result<MappedGroup> {
  let header = &group.header;
  let entity = Entity {
    id:            header.id.clone(),
    category:      class.category().to_owned(),
    container_id:  group.core("inside"),
    order:         header.order,
    nesting_level: header.level,
    source_line:   header.line,
    group_name:    Some(header.name.clone()),
    updated_at:    Some(Utc::now()),
    indexed_at:    None,
  };

  let mut used: Vec<bool> = group
    .elements
    .iter()
    .map(|e| BASE_CLASSES.contains(&e.class.as_str()))
    .collect();
  let mut annotated = vec![false; group.elements.len()];
  let mut annotations = Vec::new();
  let slots = table_slots(lineage);
  let mut rows: Vec<(Arc<ResolvedClass>, Row)> = Vec::with_capacity(slots.len());

  for (owner, columns) in &slots {
    let mut row = Row::new();
    row.set(key_column(owner), header.id.as_str());

    for column in columns {
      let found = group
        .elements
        .iter()
        .position(|e| e.class == column.column_class)
        .or_else(|| group.elements.iter().position(|e| e.name == column.name));
      let Some(index) = found else {
        continue;
      };
      let element = &group.elements[index];
      used[index] = true;
      row.set(column.column_name.clone(), coerce(column, element.core())?);

      if !annotated[index] {
        annotated[index] = true;
        annotations.extend(element.comments.iter().map(|c| format!("{}.comment: {c}", element.name)));
        annotations.extend(element.original.iter().map(|o| format!("{}.original: {o}", element.name)));
      }
    }
    rows.push((owner.clone(), row));
  }

  if !annotations.is_empty() {
    let target = slots.iter().zip(rows.iter_mut()).find_map(|((_, columns), (_, row))| {
      columns
        .iter()
        .find(|c| c.column_class == OBS || c.column_name == OBS)
        .map(|c| (c.column_name.clone(), row))
    });
    if let Some((column, row)) = target {
      let mut parts: Vec<String> = row.text(&column).map(str::to_owned).into_iter().collect();
      parts.extend(annotations);
      row.set(column, parts.join("; "));
    }
  }

  let unmapped = group
    .elements
    .iter()
    .zip(&used)
    .filter(|(_, used)| !**used)
    .map(|(e, _)| e.name.clone())
    .collect();

  Ok(MappedGroup { entity, rows, unmapped })
}

type TableSlot<'a> = (Arc<ResolvedClass>, Vec<&'a ColumnDescriptor>);

/// One entry per physical extension table along `lineage`, root table first.
///
/// Classes that share a table pool their non-key columns into its entry,
/// the most derived class first. The entry is owned by the most derived of
/// them.
fn table_slots(lineage: &[Arc<ResolvedClass>]) -> Vec<TableSlot<'_>> {
  let mut slots: Vec<TableSlot<'_>> = Vec::new();
  for class in lineage.iter().rev() {
    if class.table() == BASE_TABLE {
      continue;
    }
    let columns = class.descriptor.columns.iter().filter(|c| !c.is_key());
    match slots.iter_mut().find(|(owner, _)| owner.table() == class.table()) {
      Some((_, pooled)) => {
        for column in columns {
          let taken = pooled
            .iter()
            .any(|c| c.column_name.eq_ignore_ascii_case(&column.column_name));
          if !taken {
            pooled.push(column);
          }
        }
      }
      None => slots.push((class.clone(), columns.collect())),
    }
  }
  slots.reverse();
  slots
}

/// Convert a core value to the column's storage type. Blank numbers are
/// stored as NULL.
fn coerce(column: &ColumnDescriptor, text: Option<String>) -> Result<Value> {
  let Some(text) = text else {
    return Ok(Value::Null);
  };
  let invalid = |reason: String| Error::InvalidValue {
    column: column.column_name.clone(),
    value: text.clone(),
    reason,
  };
  let trimmed = text.trim();
  match column.storage_type() {
    StorageType::Integer | StorageType::Real if trimmed.is_empty() => Ok(Value::Null),
    StorageType::Integer => trimmed
      .parse::<i64>()
      .map(Value::Integer)
      .map_err(|e| invalid(e.to_string())),
    StorageType::Real => trimmed
      .parse::<f64>()
      .map(Value::Real)
      .map_err(|e| invalid(e.to_string())),
    StorageType::FixedText(_) | StorageType::Text => Ok(Value::Text(text.clone())),
  }
}

#[cfg(test)]
mod tests {
  use chronica_core::{
    class::{self, ClassDescriptor, ClassMapping},
    event::GroupHeader,
    ingest::Element,
  };

  use super::*;

  fn resolved(
    id: &str,
    table: &str,
    lineage: &[&str],
    columns: Vec<ColumnDescriptor>,
  ) -> Arc<ResolvedClass> {
    let mapping = ClassMapping {
      id:          id.into(),
      table_name:  table.into(),
      group_name:  id.into(),
      super_class: lineage.iter().rev().nth(1).map(|s| (*s).to_owned()),
    };
    let mut all = vec![ColumnDescriptor::key()];
    all.extend(columns);
    Arc::new(ResolvedClass {
      descriptor:    ClassDescriptor::new(mapping, all),
      lineage:       lineage.iter().map(|s| (*s).to_owned()).collect(),
      table_columns: Vec::new(),
    })
  }

  fn element(name: &str, class: &str, value: &str) -> Element {
    Element {
      name:  name.into(),
      class: class.into(),
      values: vec![value.into()],
      ..Element::default()
    }
  }

  fn group(elements: Vec<Element>) -> Group {
    Group {
      header: GroupHeader {
        id:            "p1".into(),
        name:          "n".into(),
        category_hint: None,
        order:         2,
        level:         3,
        line:          14,
      },
      elements,
    }
  }

  fn lineage() -> Vec<Arc<ResolvedClass>> {
    let entity = resolved(class::ENTITY, "entities", &[class::ENTITY], vec![]);
    let person = resolved(class::PERSON, "persons", &[class::ENTITY, class::PERSON], vec![
      ColumnDescriptor::text("name", 128),
      ColumnDescriptor::text("obs", 0),
    ]);
    let witness = resolved("witness", "witnesses", &[class::ENTITY, class::PERSON, "witness"], vec![
      ColumnDescriptor::text("idade", 0).numeric(3, 0).with_column("age").with_class("age"),
    ]);
    vec![entity, person, witness]
  }

  #[test]
  fn group_fills_every_table_of_its_lineage() {
    let lineage = lineage();
    let g = group(vec![
      element("nome", "name", "Maria"),
      element("dentro", "inside", "act-1"),
      element("idade", "age", " 41 "),
    ]);
    let mapped = map_group(&g, &lineage[2], &lineage).unwrap();

    assert_eq!(mapped.entity.category, "witness");
    assert_eq!(mapped.entity.container_id.as_deref(), Some("act-1"));
    assert_eq!(mapped.entity.source_line, 14);
    assert_eq!(mapped.rows.len(), 2);
    assert_eq!(mapped.rows[0].1.text("name"), Some("Maria"));
    assert_eq!(mapped.rows[1].1.get("age"), Some(&Value::Integer(41)));
    assert_eq!(mapped.rows[1].1.text("id"), Some("p1"));
    assert!(mapped.unmapped.is_empty());
  }

  #[test]
  fn classes_sharing_a_table_fill_one_row() {
    let mut lineage = lineage();
    lineage.truncate(2);
    lineage.push(resolved("lugar_n", "persons", &[class::ENTITY, class::PERSON, "lugar_n"], vec![
      ColumnDescriptor::text("alcunha", 64).with_class("nickname"),
      ColumnDescriptor::text("nome", 0).with_column("name"),
    ]));
    let g = group(vec![element("nome", "name", "Maria"), element("alcunha", "nickname", "a Ruiva")]);
    let mapped = map_group(&g, &lineage[2], &lineage).unwrap();

    assert_eq!(mapped.rows.len(), 1);
    let (owner, row) = &mapped.rows[0];
    assert_eq!(owner.category(), "lugar_n");
    assert_eq!(row.text("name"), Some("Maria"));
    assert_eq!(row.text("alcunha"), Some("a Ruiva"));
    assert!(mapped.unmapped.is_empty());
  }

  #[test]
  fn annotations_land_in_obs() {
    let lineage = lineage();
    let mut name = element("nome", "name", "Maria");
    name.comments.push("illegible".into());
    name.original.push("Mª".into());
    let mapped = map_group(&group(vec![name]), &lineage[1], &lineage[..2]).unwrap();

    assert_eq!(
      mapped.text("obs"),
      Some("nome.comment: illegible; nome.original: Mª")
    );
  }

  #[test]
  fn unknown_elements_are_reported() {
    let lineage = lineage();
    let g = group(vec![element("nome", "name", "Maria"), element("cor", "colour", "azul")]);
    let mapped = map_group(&g, &lineage[1], &lineage[..2]).unwrap();
    assert_eq!(mapped.unmapped, ["cor"]);
  }

  #[test]
  fn non_numeric_value_fails_the_group() {
    let lineage = lineage();
    let g = group(vec![element("idade", "age", "forty")]);
    assert!(matches!(
      map_group(&g, &lineage[2], &lineage),
      Err(Error::InvalidValue { .. })
    ));
  }
}

//! Row-level access to the entity store: the base `entities` table plus the
//! extension tables along a category's lineage.

use chronica_core::{
  class::ResolvedClass,
  entity::{Entity, EntityRecord, Row},
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::warn;

use crate::{
  Error, Result,
  db::quote,
  encode::{ENTITY_COLUMNS, RawEntity, encode_dt, from_sql, to_sql},
  synth::{self, SchemaCache},
};

// ─── Base rows ───────────────────────────────────────────────────────────────

pub fn exists(conn: &Connection, id: &str) -> Result<bool> {
  Ok(category_of(conn, id)?.is_some())
}

pub fn category_of(conn: &Connection, id: &str) -> Result<Option<String>> {
  let category = conn
    .query_row("SELECT category FROM entities WHERE id = ?1", [id], |r| r.get(0))
    .optional()?;
  Ok(category)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Entity>> {
  let raw = conn
    .query_row(
      &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
      [id],
      RawEntity::from_row,
    )
    .optional()?;
  raw.map(RawEntity::into_entity).transpose()
}

pub fn insert_base(conn: &Connection, entity: &Entity) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO entities ({ENTITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ),
    rusqlite::params![
      entity.id,
      entity.category,
      entity.container_id,
      entity.order,
      entity.nesting_level,
      entity.source_line,
      entity.group_name,
      entity.updated_at.map(encode_dt),
      entity.indexed_at.map(encode_dt),
    ],
  )?;
  Ok(())
}

/// Delete an entity and, through the foreign keys, its extension rows, its
/// contained subtree and every link to it. Returns whether a row existed.
pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
  Ok(conn.execute("DELETE FROM entities WHERE id = ?1", [id])? > 0)
}

// ─── Extension rows ──────────────────────────────────────────────────────────

/// Insert one extension row; column names must already be valid identifiers.
pub fn insert_row(conn: &Connection, table: &str, row: &Row) -> Result<()> {
  let columns: Vec<String> = row.iter().map(|(c, _)| quote(c)).collect();
  let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
  let sql = format!(
    "INSERT INTO {} ({}) VALUES ({})",
    quote(table),
    columns.join(", "),
    placeholders.join(", ")
  );
  conn.execute(&sql, rusqlite::params_from_iter(row.iter().map(|(_, v)| to_sql(v))))?;
  Ok(())
}

/// Every column of the row keyed `id` in `table`.
pub fn read_row(
  conn: &Connection,
  table: &str,
  key_column: &str,
  id: &str,
) -> Result<Option<Row>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT * FROM {} WHERE {} = ?1",
    quote(table),
    quote(key_column)
  ))?;
  let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
  let row = stmt
    .query_row([id], |r| {
      names
        .iter()
        .enumerate()
        .map(|(i, name)| Ok((name.clone(), from_sql(r.get(i)?))))
        .collect::<rusqlite::Result<Row>>()
    })
    .optional()?;
  Ok(row)
}

/// Name of the single key column of a resolved class.
pub fn key_column(class: &ResolvedClass) -> &str {
  class
    .descriptor
    .key_columns()
    .first()
    .map_or("id", |c| c.column_name.as_str())
}

/// An entity with the non-key columns of every table along its lineage.
///
/// A category that no longer resolves yields the base row alone.
pub fn get_record(
  conn: &Connection,
  cache: &mut SchemaCache,
  id: &str,
) -> Result<Option<EntityRecord>> {
  let Some(entity) = get(conn, id)? else {
    return Ok(None);
  };

  let class = match synth::resolve_category(conn, cache, &entity.category) {
    Ok(class) => class,
    Err(Error::UnknownCategory(category)) => {
      warn!(id, %category, "entity of unknown category");
      return Ok(Some(EntityRecord { entity, attributes: Row::new() }));
    }
    Err(e) => return Err(e),
  };

  let mut attributes = Row::new();
  let mut seen_tables: Vec<String> = vec!["entities".to_owned()];
  for category in &class.lineage {
    let ancestor = synth::resolve_category(conn, cache, category)?;
    if seen_tables.iter().any(|t| t == ancestor.table()) {
      continue;
    }
    seen_tables.push(ancestor.table().to_owned());

    let key = key_column(&ancestor).to_owned();
    if let Some(row) = read_row(conn, ancestor.table(), &key, id)? {
      for (column, value) in row.iter().filter(|(c, _)| **c != key) {
        attributes.set(column.clone(), value.clone());
      }
    }
  }

  Ok(Some(EntityRecord { entity, attributes }))
}

//! The schema synthesizer: turns class descriptors into tables and resolved
//! classes, and keeps the per-connection [`SchemaCache`].
//!
//! Every category is backed by a table whose key is a foreign key to its
//! superclass table, so reading an entity means joining the tables along its
//! lineage. Descriptors are persisted as entities of category `class` so a
//! later process can resolve them without the transcription that defined
//! them.

use std::{
  collections::{BTreeSet, HashMap},
  str::FromStr as _,
  sync::Arc,
};

use chrono::Utc;
use chronica_core::class::{
  self, ClassDescriptor, ClassMapping, ColumnDescriptor, ColumnType, ResolvedClass,
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{
  Error, Result, catalogue,
  db::{self, quote},
  encode::encode_dt,
  entities,
};

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Resolved classes known to one store connection.
///
/// Group bindings hold the whole [`ResolvedClass`], so one map answers both
/// "which class does this group produce" and "with which descriptor".
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
  classes: HashMap<String, Arc<ResolvedClass>>,
  groups:  HashMap<String, Arc<ResolvedClass>>,
  tables:  HashMap<String, BTreeSet<String>>,
}

impl SchemaCache {
  pub fn new() -> Self { Self::default() }

  pub fn class(&self, category: &str) -> Option<Arc<ResolvedClass>> {
    self.classes.get(category).cloned()
  }

  pub fn group(&self, group_name: &str) -> Option<Arc<ResolvedClass>> {
    self.groups.get(group_name).cloned()
  }

  /// Whether `table` is known to back some resolved class.
  pub fn knows_table(&self, table: &str) -> bool { self.tables.contains_key(table) }

  /// Forget group bindings; class resolutions stay valid across files.
  pub fn reset_groups(&mut self) { self.groups.clear(); }

  fn install(&mut self, resolved: Arc<ResolvedClass>) {
    self.tables.insert(
      resolved.table().to_owned(),
      resolved.table_columns.iter().cloned().collect(),
    );
    self.classes.insert(resolved.category().to_owned(), resolved);
  }

  fn bind_group(&mut self, group_name: &str, resolved: Arc<ResolvedClass>) {
    self.groups.insert(group_name.to_owned(), resolved);
  }

  /// Drop `category` and everything derived from it so they reload from the
  /// database with a fresh lineage.
  fn evict(&mut self, category: &str) {
    self.classes.retain(|_, c| !c.is_a(category));
    self.groups.retain(|_, c| !c.is_a(category));
  }
}

// ─── Bootstrap ───────────────────────────────────────────────────────────────

/// Persist the built-in descriptors that are missing or outdated and load
/// them into `cache`.
pub(crate) fn bootstrap(conn: &Connection, cache: &mut SchemaCache) -> Result<()> {
  let builtin = catalogue::builtin();
  for descriptor in &builtin {
    if load_descriptor(conn, descriptor.category())?.as_ref() != Some(descriptor) {
      debug!(category = descriptor.category(), "persisting built-in class");
      persist_descriptor(conn, descriptor)?;
    }
  }
  for descriptor in &builtin {
    resolve_category(conn, cache, descriptor.category())?;
  }
  Ok(())
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Resolve a category from the cache, else from its persisted descriptor.
pub fn resolve_category(
  conn: &Connection,
  cache: &mut SchemaCache,
  category: &str,
) -> Result<Arc<ResolvedClass>> {
  resolve_guarded(conn, cache, category, &mut Vec::new())
}

fn resolve_guarded(
  conn: &Connection,
  cache: &mut SchemaCache,
  category: &str,
  seen: &mut Vec<String>,
) -> Result<Arc<ResolvedClass>> {
  if let Some(resolved) = cache.class(category) {
    return Ok(resolved);
  }
  if seen.iter().any(|s| s == category) {
    return Err(Error::CyclicInheritance(category.to_owned()));
  }
  seen.push(category.to_owned());

  let descriptor = load_descriptor(conn, category)?
    .ok_or_else(|| Error::UnknownCategory(category.to_owned()))?;

  let mut lineage = match descriptor.mapping.super_class.as_deref() {
    Some(parent) => match resolve_guarded(conn, cache, parent, seen) {
      Ok(parent) => parent.lineage.clone(),
      Err(Error::UnknownCategory(_)) => {
        return Err(Error::UnknownSuperClass {
          class:       category.to_owned(),
          super_class: parent.to_owned(),
        });
      }
      Err(e) => return Err(e),
    },
    None => Vec::new(),
  };
  lineage.push(category.to_owned());

  let table_columns = db::table_columns(conn, &descriptor.mapping.table_name)?;
  if table_columns.is_empty() {
    return Err(Error::MissingTable(descriptor.mapping.table_name));
  }

  let resolved = Arc::new(ResolvedClass { descriptor, lineage, table_columns });
  cache.install(resolved.clone());
  Ok(resolved)
}

/// Resolve the class producing groups named `group_name`.
///
/// Tries the group bindings of the current file, then the most recently
/// persisted class declaring that group, then the category hint carried by
/// the group itself.
pub fn resolve_group(
  conn: &Connection,
  cache: &mut SchemaCache,
  group_name: &str,
  hint: Option<&str>,
) -> Result<Arc<ResolvedClass>> {
  if let Some(resolved) = cache.group(group_name) {
    return Ok(resolved);
  }

  let declared: Option<String> = conn
    .query_row(
      "SELECT id FROM classes WHERE group_name = ?1 ORDER BY rowid DESC LIMIT 1",
      [group_name],
      |r| r.get(0),
    )
    .optional()?;

  let resolved = match (declared, hint) {
    (Some(category), _) => resolve_category(conn, cache, &category)?,
    (None, Some(hint)) => resolve_category(conn, cache, hint)?,
    (None, None) => return Err(Error::UnknownCategory(group_name.to_owned())),
  };
  cache.bind_group(group_name, resolved.clone());
  Ok(resolved)
}

// ─── Synthesis ───────────────────────────────────────────────────────────────

/// Resolve or create the table and resolved class for `descriptor`.
///
/// Redefinitions of protected categories keep the existing mapping and only
/// bind the descriptor's group to it.
pub fn ensure_mapping(
  conn: &Connection,
  cache: &mut SchemaCache,
  descriptor: ClassDescriptor,
) -> Result<Arc<ResolvedClass>> {
  descriptor.validate()?;
  let category = descriptor.category().to_owned();
  let group = descriptor.mapping.group_name.clone();

  if class::is_protected(&category) {
    let existing = resolve_category(conn, cache, &category)?;
    debug!(%category, %group, "protected class kept as is");
    cache.bind_group(&group, existing.clone());
    return Ok(existing);
  }

  let descriptor = with_implicit_key(descriptor);

  let known = match resolve_category(conn, cache, &category) {
    Ok(known) => Some(known),
    Err(Error::UnknownCategory(_)) => None,
    Err(e) => return Err(e),
  };
  if let Some(known) = known {
    if known.descriptor == descriptor {
      cache.bind_group(&group, known.clone());
      return Ok(known);
    }
    cache.evict(&category);
  }

  let parent = match descriptor.mapping.super_class.as_deref() {
    Some(super_class) => match resolve_category(conn, cache, super_class) {
      Ok(parent) => parent,
      Err(Error::UnknownCategory(_)) => {
        return Err(Error::UnknownSuperClass {
          class:       category,
          super_class: super_class.to_owned(),
        });
      }
      Err(e) => return Err(e),
    },
    None => return Err(Error::Unrooted(category)),
  };
  if parent.is_a(&category) {
    return Err(Error::CyclicInheritance(category));
  }

  match entities::category_of(conn, &category)? {
    Some(used_by) if used_by != class::CLASS => return Err(Error::IdInUse(category)),
    _ => {}
  }

  db::check_identifier(&descriptor.mapping.table_name)?;
  for column in &descriptor.columns {
    db::check_identifier(&column.column_name)?;
  }

  let table = descriptor.mapping.table_name.clone();
  let existing = match cache.tables.get(&table) {
    Some(columns) => Some(columns.clone()),
    None if db::table_exists(conn, &table)? => {
      Some(db::table_columns(conn, &table)?.into_iter().collect())
    }
    None => None,
  };

  match existing {
    Some(columns) => evolve_table(conn, &descriptor, &columns)?,
    None => {
      let ddl = create_table_sql(&descriptor, &parent)?;
      conn.execute_batch(&ddl)?;
      info!(%category, %table, "created table");
    }
  }

  persist_descriptor(conn, &descriptor)?;

  let mut lineage = parent.lineage.clone();
  lineage.push(category.clone());
  let table_columns = db::table_columns(conn, &table)?;
  let resolved = Arc::new(ResolvedClass { descriptor, lineage, table_columns });

  cache.install(resolved.clone());
  cache.bind_group(&group, resolved.clone());
  debug!(%category, %group, %table, "class mapped");
  Ok(resolved)
}

fn with_implicit_key(mut descriptor: ClassDescriptor) -> ClassDescriptor {
  if descriptor.key_columns().is_empty() {
    descriptor.columns.insert(0, ColumnDescriptor::key());
  }
  descriptor
}

fn has_column(columns: &BTreeSet<String>, name: &str) -> bool {
  columns.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Verify the key columns of an existing table and add the missing ones.
fn evolve_table(
  conn: &Connection,
  descriptor: &ClassDescriptor,
  columns: &BTreeSet<String>,
) -> Result<()> {
  let table = &descriptor.mapping.table_name;
  for key in descriptor.key_columns() {
    if !has_column(columns, &key.column_name) {
      return Err(Error::MissingKeyColumn {
        table:  table.clone(),
        column: key.column_name.clone(),
      });
    }
  }
  for column in descriptor.columns.iter().filter(|c| !c.is_key()) {
    if has_column(columns, &column.column_name) {
      continue;
    }
    conn.execute_batch(&format!(
      "ALTER TABLE {} ADD COLUMN {} {}",
      quote(table),
      quote(&column.column_name),
      column.storage_type().sql()
    ))?;
    info!(table, column = %column.column_name, "added column");
  }
  Ok(())
}

/// DDL for a new extension table keyed on its superclass table.
pub(crate) fn create_table_sql(
  descriptor: &ClassDescriptor,
  parent: &ResolvedClass,
) -> Result<String> {
  let keys = descriptor.key_columns();
  let parent_keys = parent.descriptor.key_columns();
  if keys.len() != parent_keys.len() {
    return Err(Error::KeyArity {
      class:    descriptor.category().to_owned(),
      expected: parent_keys.len(),
      found:    keys.len(),
    });
  }

  let join = |cols: &[&ColumnDescriptor]| {
    cols
      .iter()
      .map(|c| quote(&c.column_name))
      .collect::<Vec<_>>()
      .join(", ")
  };

  let mut defs: Vec<String> = descriptor
    .columns
    .iter()
    .map(|c| {
      let not_null = if c.is_key() { " NOT NULL" } else { "" };
      format!("{} {}{not_null}", quote(&c.column_name), c.storage_type().sql())
    })
    .collect();
  defs.push(format!("PRIMARY KEY ({})", join(&keys)));
  defs.push(format!(
    "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
    join(&keys),
    quote(parent.table()),
    join(&parent_keys)
  ));

  Ok(format!(
    "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
    quote(&descriptor.mapping.table_name),
    defs.join(",\n    ")
  ))
}

// ─── Persistence ─────────────────────────────────────────────────────────────

/// Replace the stored copy of `descriptor`.
fn persist_descriptor(conn: &Connection, descriptor: &ClassDescriptor) -> Result<()> {
  let m = &descriptor.mapping;
  conn.execute("DELETE FROM entities WHERE id = ?1", [&m.id])?;
  conn.execute(
    "INSERT INTO entities (id, category, group_name, updated_at) VALUES (?1, ?2, ?2, ?3)",
    rusqlite::params![m.id, class::CLASS, encode_dt(Utc::now())],
  )?;
  conn.execute(
    "INSERT INTO classes (id, table_name, group_name, super_class) VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![m.id, m.table_name, m.group_name, m.super_class],
  )?;

  let mut stmt = conn.prepare(
    "INSERT INTO class_attributes (
       class_id, position, name, column_name, column_class, column_type,
       size, precision_digits, primary_key_rank
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
  )?;
  for (position, c) in descriptor.columns.iter().enumerate() {
    stmt.execute(rusqlite::params![
      m.id,
      position as i64,
      c.name,
      c.column_name,
      c.column_class,
      c.column_type.to_string(),
      c.size,
      c.precision,
      c.primary_key_rank,
    ])?;
  }
  Ok(())
}

/// Load a persisted descriptor by category.
fn load_descriptor(conn: &Connection, category: &str) -> Result<Option<ClassDescriptor>> {
  let mapping = conn
    .query_row(
      "SELECT id, table_name, group_name, super_class FROM classes WHERE id = ?1",
      [category],
      |r| {
        Ok(ClassMapping {
          id:          r.get(0)?,
          table_name:  r.get(1)?,
          group_name:  r.get(2)?,
          super_class: r.get(3)?,
        })
      },
    )
    .optional()?;
  let Some(mapping) = mapping else {
    return Ok(None);
  };

  let mut stmt = conn.prepare(
    "SELECT name, column_name, column_class, column_type, size, precision_digits,
            primary_key_rank
     FROM class_attributes WHERE class_id = ?1 ORDER BY position",
  )?;
  let raw = stmt
    .query_map([category], |r| {
      Ok((
        r.get::<_, String>(0)?,
        r.get::<_, String>(1)?,
        r.get::<_, String>(2)?,
        r.get::<_, String>(3)?,
        r.get::<_, u32>(4)?,
        r.get::<_, u32>(5)?,
        r.get::<_, u32>(6)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let columns = raw
    .into_iter()
    .map(|(name, column_name, column_class, column_type, size, precision, rank)| {
      let column_type = ColumnType::from_str(&column_type)
        .map_err(|_| chronica_core::Error::UnknownColumnType(column_type))?;
      Ok(ColumnDescriptor {
        name,
        column_name,
        column_class,
        column_type,
        size,
        precision,
        primary_key_rank: rank,
      })
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(Some(ClassDescriptor::new(mapping, columns)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mapping(id: &str, table: &str, super_class: &str) -> ClassMapping {
    ClassMapping {
      id:          id.into(),
      table_name:  table.into(),
      group_name:  id.into(),
      super_class: Some(super_class.into()),
    }
  }

  fn persons() -> ResolvedClass {
    ResolvedClass {
      descriptor:    ClassDescriptor::new(mapping(class::PERSON, "persons", class::ENTITY), vec![
        ColumnDescriptor::key(),
      ]),
      lineage:       vec![class::ENTITY.into(), class::PERSON.into()],
      table_columns: vec!["id".into()],
    }
  }

  #[test]
  fn ddl_keys_on_the_superclass_table() {
    let descriptor = ClassDescriptor::new(mapping("witness", "witnesses", class::PERSON), vec![
      ColumnDescriptor::key(),
      ColumnDescriptor::text("age", 0).numeric(3, 0),
      ColumnDescriptor::text("notes", 0),
    ]);
    let ddl = create_table_sql(&descriptor, &persons()).unwrap();
    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"witnesses\""));
    assert!(ddl.contains("\"id\" VARCHAR(64) NOT NULL"));
    assert!(ddl.contains("\"age\" INTEGER"));
    assert!(ddl.contains("\"notes\" TEXT"));
    assert!(ddl.contains("PRIMARY KEY (\"id\")"));
    assert!(ddl.contains(
      "FOREIGN KEY (\"id\") REFERENCES \"persons\" (\"id\") ON DELETE CASCADE"
    ));
  }

  #[test]
  fn ddl_rejects_mismatched_key_arity() {
    let mut seq = ColumnDescriptor::text("seq", 0).numeric(4, 0);
    seq.primary_key_rank = 2;
    let descriptor = ClassDescriptor::new(mapping("line", "lines", class::PERSON), vec![
      ColumnDescriptor::key(),
      seq,
    ]);
    assert!(matches!(
      create_table_sql(&descriptor, &persons()),
      Err(Error::KeyArity { expected: 1, found: 2, .. })
    ));
  }

  #[test]
  fn implicit_key_goes_first() {
    let descriptor = with_implicit_key(ClassDescriptor::new(
      mapping("witness", "witnesses", class::PERSON),
      vec![ColumnDescriptor::text("age", 0)],
    ));
    assert_eq!(descriptor.columns[0], ColumnDescriptor::key());
    assert_eq!(descriptor.columns.len(), 2);
  }

  #[test]
  fn evicting_a_class_drops_its_descendants() {
    let mut cache = SchemaCache::new();
    let person = Arc::new(persons());
    let mut witness = persons();
    witness.descriptor.mapping = mapping("witness", "witnesses", class::PERSON);
    witness.lineage.push("witness".into());

    cache.install(person.clone());
    cache.install(Arc::new(witness));
    cache.bind_group("n", person);
    cache.evict(class::PERSON);

    assert!(cache.class("witness").is_none());
    assert!(cache.group("n").is_none());
    assert!(cache.knows_table("persons"));
  }
}

//! The import orchestrator: an [`ImportHandler`] that stores what the
//! [`EventParser`](chronica_core::ingest::EventParser) assembles.
//!
//! Commits happen after each class definition, each group and each
//! meta-relation, so a bad record is reported against its line and never
//! rolls back its siblings.

use std::{sync::Arc, time::Instant};

use chrono::Utc;
use chronica_core::{
  class::{self, ClassDescriptor, ResolvedClass},
  entity::{Entity, Relation, Row},
  event::{FileHeader, MetaRelation, MetaRelationKind},
  import::{ImportOptions, ImportStats, ImportStatus},
  ingest::{Group, ImportHandler, StructuralError},
  store::Decision,
};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::{
  Error, Result, crossref,
  db::in_transaction,
  entities, mapping, resolve, status,
  synth::{self, SchemaCache},
};

/// Work deferred to the end of the file because its destination did not
/// exist yet.
#[derive(Debug)]
enum Postponed {
  Relation(Group),
  SameAs(MetaRelation),
}

/// Transient state of the file being imported.
#[derive(Debug)]
struct FileState {
  header:       FileHeader,
  started:      Instant,
  errors:       Vec<String>,
  warnings:     Vec<String>,
  postponed:    Vec<Postponed>,
  /// Sources stored in this file, in order of appearance.
  sources:      Vec<String>,
  entity_count: usize,
}

impl FileState {
  fn new(header: FileHeader) -> Self {
    Self {
      header,
      started: Instant::now(),
      errors: Vec::new(),
      warnings: Vec::new(),
      postponed: Vec::new(),
      sources: Vec::new(),
      entity_count: 0,
    }
  }
}

enum Stored {
  Done { unmapped: Vec<String>, source: bool },
  /// Relation whose destination is not in the store yet.
  Waiting(String),
}

/// Stores one session's worth of files on a borrowed connection.
pub struct Importer<'a> {
  conn:     &'a mut Connection,
  cache:    &'a mut SchemaCache,
  options:  ImportOptions,
  file:     Option<FileState>,
  finished: Vec<ImportStats>,
}

impl<'a> Importer<'a> {
  pub fn new(conn: &'a mut Connection, cache: &'a mut SchemaCache, options: ImportOptions) -> Self {
    Self { conn, cache, options, file: None, finished: Vec::new() }
  }

  /// Statistics of every file closed so far.
  pub fn into_stats(self) -> Vec<ImportStats> { self.finished }

  fn path(&self) -> &str { self.file.as_ref().map_or("", |f| f.header.path.as_str()) }

  fn error(&mut self, line: Option<i64>, message: String) {
    let message = match line {
      Some(line) => format!("line {line}: {message}"),
      None => message,
    };
    warn!(path = self.path(), %message, "import error");
    if let Some(file) = self.file.as_mut() {
      file.errors.push(message);
    }
  }

  fn warning(&mut self, line: Option<i64>, message: String) {
    let message = match line {
      Some(line) => format!("line {line}: {message}"),
      None => message,
    };
    warn!(path = self.path(), %message, "import warning");
    if let Some(file) = self.file.as_mut() {
      file.warnings.push(message);
    }
  }

  fn stored(&mut self) {
    if let Some(file) = self.file.as_mut() {
      file.entity_count += 1;
    }
  }

  // ── Groups ────────────────────────────────────────────────────────────────

  fn lineage(&mut self, class: &ResolvedClass) -> Result<Vec<Arc<ResolvedClass>>> {
    class
      .lineage
      .iter()
      .map(|category| synth::resolve_category(self.conn, self.cache, category))
      .collect()
  }

  /// Store a group, replacing any entity with the same id. Outside the final
  /// pass a relation to a missing destination is left for later.
  fn store_group(&mut self, group: &Group, final_pass: bool) -> Result<Stored> {
    let class = synth::resolve_group(
      self.conn,
      self.cache,
      &group.header.name,
      group.header.category_hint.as_deref(),
    )?;
    let lineage = self.lineage(&class)?;
    let mapped = mapping::map_group(group, &class, &lineage)?;

    if class.is_a(class::RELATION) {
      if let Some(destination) = mapped.text("destination") {
        if !entities::exists(self.conn, destination)? {
          return if final_pass {
            Err(Error::OccurrenceNotFound(destination.to_owned()))
          } else {
            Ok(Stored::Waiting(destination.to_owned()))
          };
        }
      }
    }

    let source = class.is_a(class::SOURCE);
    in_transaction(self.conn, |tx| {
      replaceable(tx, group.id())?;
      if source {
        crossref::capture(tx, group.id())?;
      }
      entities::delete(tx, group.id())?;
      entities::insert_base(tx, &mapped.entity)?;
      for (class, row) in &mapped.rows {
        entities::insert_row(tx, class.table(), row)?;
      }
      Ok(())
    })?;

    debug!(id = group.id(), category = class.category(), "group stored");
    Ok(Stored::Done { unmapped: mapped.unmapped, source })
  }

  fn handle_group(&mut self, group: Group, final_pass: bool) {
    let line = Some(group.line());
    match self.store_group(&group, final_pass) {
      Ok(Stored::Done { unmapped, source }) => {
        self.stored();
        if let Some(file) = self.file.as_mut().filter(|_| source) {
          if !file.sources.iter().any(|s| s == group.id()) {
            file.sources.push(group.id().to_owned());
          }
        }
        for name in unmapped {
          self.warning(line, format!("group {}: element {name} not stored", group.id()));
        }
      }
      Ok(Stored::Waiting(destination)) => {
        debug!(id = group.id(), %destination, "relation postponed");
        if let Some(file) = self.file.as_mut() {
          file.postponed.push(Postponed::Relation(group));
        }
      }
      Err(Error::OccurrenceNotFound(destination)) if final_pass => {
        self.error(line, format!("relation {}: destination {destination} not found", group.id()));
      }
      Err(e) => {
        self.error(line, format!("group {} ({}): {e}", group.id(), group.header.name));
      }
    }
  }

  // ── Meta-relations ────────────────────────────────────────────────────────

  fn handle_same_as(&mut self, meta: MetaRelation, final_pass: bool) {
    let line = Some(meta.line);
    match entities::exists(self.conn, &meta.destination) {
      Ok(true) => {}
      Ok(false) if final_pass => {
        self.error(line, format!("same as {}: {} not found", meta.id, meta.destination));
        return;
      }
      Ok(false) => {
        debug!(id = %meta.id, destination = %meta.destination, "same as postponed");
        if let Some(file) = self.file.as_mut() {
          file.postponed.push(Postponed::SameAs(meta));
        }
        return;
      }
      Err(e) => {
        self.error(line, format!("same as {}: {e}", meta.id));
        return;
      }
    }

    if let Err(e) = self.store_same_as(&meta) {
      self.error(line, format!("same as {}: {e}", meta.id));
      return;
    }
    self.stored();

    let decision = Decision::new(self.options.user.clone(), self.options.same_as_status)
      .with_rule(format!("{}:{}", Relation::SAME_AS, meta.id));
    let merged = in_transaction(self.conn, |tx| {
      resolve::same_as(tx, &meta.origin, &meta.destination, &decision)
    });
    match merged {
      Ok(real) => debug!(id = %meta.id, real_id = %real.id, "same as applied"),
      Err(e) => self.error(line, format!("same as {}: {e}", meta.id)),
    }
  }

  /// Keep the identity statement as a relation contained in its origin.
  fn store_same_as(&mut self, meta: &MetaRelation) -> Result<()> {
    let relations = synth::resolve_category(self.conn, self.cache, class::RELATION)?;
    let entity = Entity {
      container_id: Some(meta.origin.clone()),
      source_line: meta.line,
      group_name: Some(Relation::SAME_AS.to_owned()),
      ..Entity::detached(meta.id.as_str(), class::RELATION)
    };
    let mut row = Row::new();
    row.set(entities::key_column(&relations), meta.id.as_str());
    row.set("origin", meta.origin.as_str());
    row.set("destination", meta.destination.as_str());
    row.set("rel_type", Relation::IDENTIFICATION);
    row.set("rel_value", Relation::SAME_AS);
    row.set("obs", meta.extra.clone());

    in_transaction(self.conn, |tx| {
      replaceable(tx, &meta.id)?;
      entities::delete(tx, &meta.id)?;
      entities::insert_base(tx, &entity)?;
      entities::insert_row(tx, relations.table(), &row)
    })
  }

  fn handle_attach(&mut self, meta: MetaRelation) {
    let line = Some(meta.line);
    let mut decision = Decision::new(self.options.user.clone(), self.options.same_as_status);
    decision.rule = meta.value.clone();

    let attached = in_transaction(self.conn, |tx| {
      resolve::attach_occurrence(tx, &meta.destination, &meta.origin, &decision)
    });
    match attached {
      Ok(_) => {
        self.stored();
        debug!(occurrence = %meta.origin, real_id = %meta.destination, "attached");
      }
      Err(Error::AlreadyLinked { real_id, .. }) if real_id == meta.destination => {
        debug!(occurrence = %meta.origin, %real_id, "already attached");
      }
      Err(Error::RealEntityNotFound(real_id)) => {
        self.error(line, format!("attach {}: real entity {real_id} not found", meta.origin));
      }
      Err(e) => self.error(line, format!("attach {}: {e}", meta.origin)),
    }
  }

  // ── End of file ───────────────────────────────────────────────────────────

  fn replay_postponed(&mut self) {
    let postponed = self
      .file
      .as_mut()
      .map(|f| std::mem::take(&mut f.postponed))
      .unwrap_or_default();
    if !postponed.is_empty() {
      debug!(path = self.path(), count = postponed.len(), "replaying postponed relations");
    }
    for item in postponed {
      match item {
        Postponed::Relation(group) => self.handle_group(group, true),
        Postponed::SameAs(meta) => self.handle_same_as(meta, true),
      }
    }
  }

  fn restore_sources(&mut self) {
    let sources = self.file.as_ref().map(|f| f.sources.clone()).unwrap_or_default();
    for source in sources {
      match crossref::restore(self.conn, &source, &self.options) {
        Ok(findings) => {
          for message in findings.errors {
            self.error(None, message);
          }
          for message in findings.warnings {
            self.warning(None, message);
          }
        }
        Err(e) => self.error(None, format!("source {source}: restoring references failed: {e}")),
      }
    }
  }

  /// Write the status record and close the file's statistics.
  fn close(&mut self, aborted: bool) -> Result<()> {
    let Some(file) = self.file.take() else {
      return Ok(());
    };

    let record = ImportStatus {
      path:           file.header.path.clone(),
      name:           file.header.display_name().to_owned(),
      structure:      file.header.structure.clone(),
      translator:     file.header.translator.clone(),
      translated_at:  file.header.translated_at,
      error_count:    file.errors.len(),
      warning_count:  file.warnings.len(),
      error_report:   file.errors.join("\n"),
      warning_report: file.warnings.join("\n"),
      imported_at:    if aborted { None } else { Some(Utc::now()) },
    };
    status::write(self.conn, &record)?;

    let stats = ImportStats {
      path: file.header.path,
      errors: file.errors,
      warnings: file.warnings,
      entity_count: file.entity_count,
      duration: file.started.elapsed(),
      aborted,
    };
    info!(
      path = %stats.path,
      entities = stats.entity_count,
      errors = stats.errors.len(),
      warnings = stats.warnings.len(),
      aborted,
      elapsed_ms = stats.duration.as_millis() as u64,
      "file imported"
    );
    self.finished.push(stats);
    Ok(())
  }
}

/// Refuse to overwrite class descriptors and real entities with transcribed
/// data.
fn replaceable(conn: &Connection, id: &str) -> Result<()> {
  match entities::category_of(conn, id)? {
    Some(category) if category == class::CLASS || category == class::REAL_ENTITY => {
      Err(Error::IdInUse(id.to_owned()))
    }
    _ => Ok(()),
  }
}

impl ImportHandler for Importer<'_> {
  type Error = Error;

  fn file_started(&mut self, header: FileHeader) -> Result<()> {
    info!(path = %header.path, structure = %header.structure, "importing file");
    self.cache.reset_groups();
    status::mark_in_progress(self.conn, &header)?;
    self.file = Some(FileState::new(header));
    Ok(())
  }

  fn class_defined(&mut self, descriptor: ClassDescriptor) -> Result<()> {
    let category = descriptor.category().to_owned();
    let mut staged = self.cache.clone();
    let mapped = in_transaction(self.conn, |tx| synth::ensure_mapping(tx, &mut staged, descriptor));
    match mapped {
      Ok(resolved) => {
        *self.cache = staged;
        debug!(%category, table = resolved.table(), "class defined");
      }
      Err(e) => self.error(None, format!("class {category}: {e}")),
    }
    Ok(())
  }

  fn group(&mut self, group: Group) -> Result<()> {
    self.handle_group(group, false);
    Ok(())
  }

  fn meta_relation(&mut self, relation: MetaRelation) -> Result<()> {
    match relation.kind {
      MetaRelationKind::SameAs => self.handle_same_as(relation, false),
      MetaRelationKind::AttachToRealEntity => self.handle_attach(relation),
    }
    Ok(())
  }

  fn file_ended(&mut self) -> Result<()> {
    self.replay_postponed();
    self.restore_sources();
    self.close(false)
  }

  fn file_aborted(&mut self, error: StructuralError) -> Result<()> {
    self.error(error.line, format!("structural error, file abandoned: {error}"));
    self.close(true)
  }
}

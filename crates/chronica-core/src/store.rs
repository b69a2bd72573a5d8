//! The `EntityStore` trait and supporting request types.
//!
//! The trait is implemented by storage backends (e.g.
//! `chronica-store-sqlite`). Batch import jobs and other callers depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  class::{ClassDescriptor, ResolvedClass},
  entity::{Entity, EntityRecord, Relation},
  event::Event,
  import::{ImportOptions, ImportStats, ImportStatus},
  resolution::{Link, RealEntity, Status},
};

// ─── Request type ────────────────────────────────────────────────────────────

/// Who is making an identification decision, with what authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
  pub user:    String,
  pub status:  Status,
  /// Explicit id for a real entity this decision creates.
  pub real_id: Option<String>,
  /// Provenance recorded on the links this decision creates.
  pub rule:    Option<String>,
}

impl Decision {
  pub fn new(user: impl Into<String>, status: Status) -> Self {
    Self { user: user.into(), status, real_id: None, rule: None }
  }

  pub fn with_real_id(mut self, real_id: impl Into<String>) -> Self {
    self.real_id = Some(real_id.into());
    self
  }

  pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
    self.rule = Some(rule.into());
    self
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Chronica store backend.
///
/// Each resolution operation is atomic. Imports are not: they commit after
/// every class definition, group and meta-relation so that one bad record
/// never rolls back its siblings.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait EntityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ingestion ─────────────────────────────────────────────────────────

  /// Import the translated event stream of exactly one file. A stream
  /// holding several files is refused before anything is stored.
  fn import_file(
    &self,
    events: Vec<Event>,
    options: ImportOptions,
  ) -> impl Future<Output = Result<ImportStats, Self::Error>> + Send + '_;

  /// Import a stream that may contain several files, one stats entry each.
  fn import_stream(
    &self,
    events: Vec<Event>,
    options: ImportOptions,
  ) -> impl Future<Output = Result<Vec<ImportStats>, Self::Error>> + Send + '_;

  /// The status record of the last import of `path`.
  fn import_status<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<ImportStatus>, Self::Error>> + Send + 'a;

  // ── Schema ────────────────────────────────────────────────────────────

  /// Resolve or create the table and mapping for a class descriptor.
  fn ensure_mapping(
    &self,
    descriptor: ClassDescriptor,
  ) -> impl Future<Output = Result<ResolvedClass, Self::Error>> + Send + '_;

  /// Resolve a category already known to the store.
  fn resolve_category<'a>(
    &'a self,
    category: &'a str,
  ) -> impl Future<Output = Result<ResolvedClass, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// An entity with all extension columns along its lineage.
  fn get_entity<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<EntityRecord>, Self::Error>> + Send + 'a;

  fn get_relation<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Relation>, Self::Error>> + Send + 'a;

  fn get_real_entity<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<RealEntity>, Self::Error>> + Send + 'a;

  /// Base rows of every occurrence linked to `real_id`, ordered by id.
  fn get_occurrences<'a>(
    &'a self,
    real_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Every link held by an occurrence, across users.
  fn links_for<'a>(
    &'a self,
    occurrence_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + 'a;

  // ── Resolution ────────────────────────────────────────────────────────

  /// Declare that two occurrences denote the same real entity, creating,
  /// extending or merging real entities as needed.
  fn same_as<'a>(
    &'a self,
    occ_a: &'a str,
    occ_b: &'a str,
    decision: Decision,
  ) -> impl Future<Output = Result<RealEntity, Self::Error>> + Send + 'a;

  /// Make a single occurrence into (or find its) real entity.
  fn make_real<'a>(
    &'a self,
    occurrence_id: &'a str,
    decision: Decision,
  ) -> impl Future<Output = Result<RealEntity, Self::Error>> + Send + 'a;

  /// Bind an occurrence to an existing real entity.
  fn attach_occurrence<'a>(
    &'a self,
    real_id: &'a str,
    occurrence_id: &'a str,
    decision: Decision,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + 'a;

  /// Delete a real entity and its links. A missing id yields `None` when
  /// `silent`, an error otherwise.
  fn delete_real_entity<'a>(
    &'a self,
    real_id: &'a str,
    silent: bool,
  ) -> impl Future<Output = Result<Option<RealEntity>, Self::Error>> + Send + 'a;

  /// A random numeric id of `length` digits not used by any entity. A zero
  /// `length` is an error.
  fn generate_id(
    &self,
    length: usize,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;
}

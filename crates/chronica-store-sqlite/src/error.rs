//! Error type for `chronica-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] chronica_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("schema cache lock poisoned")]
  LockPoisoned,

  #[error("event stream contains no file")]
  NoFileInStream,

  #[error("event stream contains {0} files; import it as a stream")]
  SeveralFilesInStream(usize),

  // ── Schema ────────────────────────────────────────────────────────────────

  #[error("unknown category: {0:?}")]
  UnknownCategory(String),

  #[error("class {class:?} extends unknown class {super_class:?}")]
  UnknownSuperClass { class: String, super_class: String },

  #[error("class {0:?} would make its own ancestry cyclic")]
  CyclicInheritance(String),

  #[error("class {0:?} does not descend from a protected root")]
  Unrooted(String),

  #[error("invalid SQL identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error("table {table:?} lacks key column {column:?}")]
  MissingKeyColumn { table: String, column: String },

  #[error("table {0:?} for a known class does not exist")]
  MissingTable(String),

  #[error("class {class:?} has {found} key columns but its superclass has {expected}")]
  KeyArity { class: String, expected: usize, found: usize },

  #[error("invalid value {value:?} for column {column:?}: {reason}")]
  InvalidValue { column: String, value: String, reason: String },

  // ── Resolution ────────────────────────────────────────────────────────────

  #[error("occurrence not found: {0}")]
  OccurrenceNotFound(String),

  #[error("category mismatch: {left:?} vs {right:?}")]
  CategoryMismatch { left: String, right: String },

  #[error("requested real entity {requested:?} conflicts with existing {existing:?}")]
  RealIdConflict { requested: String, existing: String },

  #[error("real entity not found: {0}")]
  RealEntityNotFound(String),

  #[error("id already used by another entity: {0}")]
  IdInUse(String),

  #[error("occurrence {occurrence} is already linked to {real_id}")]
  AlreadyLinked { occurrence: String, real_id: String },

  #[error("no free id found after {0} attempts")]
  IdSpaceExhausted(usize),

  #[error("generated ids need at least one digit")]
  ZeroLengthId,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

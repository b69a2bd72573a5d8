//! Import options, per-file results, and the persisted file status record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resolution::Status;

/// Caller-supplied settings for one import session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
  /// User recorded on links created from "same as" meta-relations.
  pub user:           String,
  /// Status given to those links and the real entities they create.
  pub same_as_status: Status,
}

impl Default for ImportOptions {
  fn default() -> Self {
    Self { user: "import".to_owned(), same_as_status: Status::Source }
  }
}

/// Outcome of importing one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStats {
  pub path:         String,
  pub errors:       Vec<String>,
  pub warnings:     Vec<String>,
  /// Groups stored, including postponed relations replayed at file end.
  pub entity_count: usize,
  pub duration:     Duration,
  /// `true` when the file was abandoned because of malformed nesting.
  pub aborted:      bool,
}

impl ImportStats {
  pub fn is_clean(&self) -> bool { self.errors.is_empty() && !self.aborted }
}

/// The persisted health record of the last import of one path.
///
/// Replaced wholesale on every import. `imported_at == None` means an import
/// is in progress, crashed, or was aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStatus {
  pub path:           String,
  pub name:           String,
  pub structure:      String,
  pub translator:     String,
  pub translated_at:  Option<DateTime<Utc>>,
  pub error_count:    usize,
  pub warning_count:  usize,
  pub error_report:   String,
  pub warning_report: String,
  pub imported_at:    Option<DateTime<Utc>>,
}

impl ImportStatus {
  pub fn in_progress(&self) -> bool { self.imported_at.is_none() }
}

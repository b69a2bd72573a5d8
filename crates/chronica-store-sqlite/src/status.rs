//! The per-path import status record.

use chronica_core::{event::FileHeader, import::ImportStatus};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{Result, encode::{RawImportStatus, encode_dt}};

/// Mark `header.path` as being imported: counts are reset and the completion
/// time cleared, so an interrupted import stays visible.
pub fn mark_in_progress(conn: &Connection, header: &FileHeader) -> Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO import_status
       (path, name, structure, translator, translated_at, imported_at)
     VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
    rusqlite::params![
      header.path,
      header.display_name(),
      header.structure,
      header.translator,
      header.translated_at.map(encode_dt),
    ],
  )?;
  Ok(())
}

/// Replace the record for `status.path`.
pub fn write(conn: &Connection, status: &ImportStatus) -> Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO import_status
       (path, name, structure, translator, translated_at, error_count, warning_count,
        error_report, warning_report, imported_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      status.path,
      status.name,
      status.structure,
      status.translator,
      status.translated_at.map(encode_dt),
      status.error_count as i64,
      status.warning_count as i64,
      status.error_report,
      status.warning_report,
      status.imported_at.map(encode_dt),
    ],
  )?;
  Ok(())
}

pub fn read(conn: &Connection, path: &str) -> Result<Option<ImportStatus>> {
  let raw = conn
    .query_row(
      &format!("{} WHERE path = ?1", RawImportStatus::SELECT),
      [path],
      RawImportStatus::from_row,
    )
    .optional()?;
  raw.map(RawImportStatus::into_status).transpose()
}

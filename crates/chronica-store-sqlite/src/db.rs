//! Small SQL helpers shared by the synchronous store modules.

use rusqlite::{Connection, OptionalExtension as _};

use crate::{Error, Result};

/// Reject anything that is not a plain SQL identifier.
///
/// Table and column names come from transcriptions and end up spliced into
/// DDL, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn check_identifier(name: &str) -> Result<&str> {
  let mut chars = name.chars();
  let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid { Ok(name) } else { Err(Error::InvalidIdentifier(name.to_owned())) }
}

/// Quote an identifier that already passed [`check_identifier`].
pub fn quote(name: &str) -> String { format!("\"{name}\"") }

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
  let found = conn
    .query_row(
      "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
      [table],
      |_| Ok(()),
    )
    .optional()?;
  Ok(found.is_some())
}

/// Physical column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
  let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
  let columns = stmt
    .query_map([table], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(columns)
}

/// Run `f` inside a transaction, committing only when it succeeds.
pub fn in_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction()?;
  let value = f(&tx)?;
  tx.commit()?;
  Ok(value)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identifiers_are_restricted() {
    assert!(check_identifier("persons_ext").is_ok());
    assert!(check_identifier("_x1").is_ok());
    assert!(check_identifier("1st").is_err());
    assert!(check_identifier("name; DROP TABLE entities").is_err());
    assert!(check_identifier("").is_err());
  }

  #[test]
  fn failed_transaction_leaves_no_trace() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

    let result: Result<()> = in_transaction(&mut conn, |tx| {
      tx.execute("INSERT INTO t VALUES (1)", [])?;
      Err(Error::LockPoisoned)
    });
    assert!(result.is_err());

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
    assert_eq!(count, 0);
    assert_eq!(table_columns(&conn, "t").unwrap(), ["x"]);
    assert!(table_exists(&conn, "t").unwrap());
    assert!(!table_exists(&conn, "u").unwrap());
  }
}

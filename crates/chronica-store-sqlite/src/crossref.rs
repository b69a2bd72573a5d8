//! Preservation of cross-file references across the re-import of a source.
//!
//! Before a source is deleted for re-import, [`capture`] saves every relation
//! pointing into it from outside and every link held by an occurrence inside
//! it. Deleting the source nulls those relation destinations and drops those
//! links; once the file has been imported again, [`restore`] puts back what
//! still makes sense and reports the rest.

use std::collections::HashSet;

use chrono::Utc;
use chronica_core::{
  entity::Relation,
  import::ImportOptions,
  resolution::Status,
  store::Decision,
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{
  Result,
  db::in_transaction,
  encode::{decode_status, encode_dt},
  entities, resolve,
};

/// Every entity contained, at any depth, in `?1`, including itself.
const SUBTREE: &str = "WITH RECURSIVE subtree(id) AS (
    SELECT ?1
    UNION
    SELECT e.id FROM entities e JOIN subtree s ON e.container_id = s.id
  )";

/// Errors and warnings produced while restoring one source.
#[derive(Debug, Default)]
pub struct Findings {
  pub errors:   Vec<String>,
  pub warnings: Vec<String>,
}

/// Save the references into `source_id` that deleting it would break.
/// Returns the number of relations and links captured.
pub fn capture(conn: &Connection, source_id: &str) -> Result<(usize, usize)> {
  let now = encode_dt(Utc::now());
  let relations = conn.execute(
    &format!(
      "{SUBTREE}
       INSERT OR REPLACE INTO preserved_relations
         (relation_id, source_id, origin, destination, rel_type, rel_value, captured_at)
       SELECT r.id, ?1, r.origin, r.destination, r.rel_type, r.rel_value, ?2
       FROM relations r
       WHERE r.destination IN (SELECT id FROM subtree)
         AND r.id NOT IN (SELECT id FROM subtree)
         AND r.origin NOT IN (SELECT id FROM subtree)"
    ),
    [source_id, now.as_str()],
  )?;
  let links = conn.execute(
    &format!(
      "{SUBTREE}
       INSERT OR REPLACE INTO preserved_links
         (real_entity_id, occurrence_id, owner_user, rule, status, source_id, captured_at)
       SELECT l.real_entity_id, l.occurrence_id, l.owner_user, l.rule, l.status, ?1, ?2
       FROM links l
       WHERE l.occurrence_id IN (SELECT id FROM subtree)"
    ),
    [source_id, now.as_str()],
  )?;
  if relations + links > 0 {
    debug!(source_id, relations, links, "captured cross-file references");
  }
  Ok((relations, links))
}

struct PreservedRelation {
  id:          String,
  origin:      String,
  destination: String,
  value:       Option<String>,
}

struct PreservedLink {
  real_entity_id: String,
  occurrence_id:  String,
  owner_user:     String,
  rule:           Option<String>,
  status:         Status,
}

/// Restore the references captured for `source_id` after its re-import.
pub fn restore(
  conn: &mut Connection,
  source_id: &str,
  options: &ImportOptions,
) -> Result<Findings> {
  let mut findings = Findings::default();
  restore_relations(conn, source_id, options, &mut findings)?;
  restore_links(conn, source_id, &mut findings)?;
  info!(
    source_id,
    errors = findings.errors.len(),
    warnings = findings.warnings.len(),
    "restored cross-file references"
  );
  Ok(findings)
}

fn restore_relations(
  conn: &mut Connection,
  source_id: &str,
  options: &ImportOptions,
  findings: &mut Findings,
) -> Result<()> {
  let preserved = {
    let mut stmt = conn.prepare(
      "SELECT relation_id, origin, destination, rel_value FROM preserved_relations
       WHERE source_id = ?1 ORDER BY relation_id",
    )?;
    stmt
      .query_map([source_id], |r| {
        Ok(PreservedRelation {
          id:          r.get(0)?,
          origin:      r.get(1)?,
          destination: r.get(2)?,
          value:       r.get(3)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  for saved in preserved {
    let reapply = in_transaction(conn, |tx| {
      let current: Option<Option<String>> = tx
        .query_row("SELECT destination FROM relations WHERE id = ?1", [&saved.id], |r| {
          r.get(0)
        })
        .optional()?;
      let restored = matches!(current, Some(None));

      match current {
        None => {
          findings.warnings.push(format!(
            "relation {} from {} to {} no longer exists",
            saved.id, saved.origin, saved.destination
          ));
        }
        Some(None) if !entities::exists(tx, &saved.destination)? => {
          findings.errors.push(format!(
            "relation {} from {}: destination {} no longer exists after re-import of {source_id}",
            saved.id, saved.origin, saved.destination
          ));
          return Ok(false);
        }
        Some(None) => {
          tx.execute("UPDATE relations SET destination = ?1 WHERE id = ?2", [
            &saved.destination,
            &saved.id,
          ])?;
          debug!(relation = %saved.id, destination = %saved.destination, "relation restored");
        }
        Some(Some(destination)) => {
          findings.warnings.push(format!(
            "relation {} from {} to {destination} was not affected by the re-import of {source_id}",
            saved.id, saved.origin
          ));
        }
      }
      tx.execute("DELETE FROM preserved_relations WHERE relation_id = ?1", [&saved.id])?;
      Ok(restored)
    })?;

    if reapply && saved.value.as_deref() == Some(Relation::SAME_AS) {
      let decision = Decision::new(options.user.clone(), options.same_as_status)
        .with_rule(format!("same_as:{}", saved.id));
      let merged = in_transaction(conn, |tx| {
        resolve::same_as(tx, &saved.origin, &saved.destination, &decision)
      });
      if let Err(e) = merged {
        findings.errors.push(format!("relation {}: same as not re-applied: {e}", saved.id));
      }
    }
  }
  Ok(())
}

fn load_preserved_links(conn: &Connection, source_id: &str) -> Result<Vec<PreservedLink>> {
  let mut stmt = conn.prepare(
    "SELECT real_entity_id, occurrence_id, owner_user, rule, status FROM preserved_links
     WHERE source_id = ?1 ORDER BY occurrence_id, real_entity_id",
  )?;
  let raw = stmt
    .query_map([source_id], |r| {
      Ok((
        r.get::<_, String>(0)?,
        r.get::<_, String>(1)?,
        r.get::<_, String>(2)?,
        r.get::<_, Option<String>>(3)?,
        r.get::<_, String>(4)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raw
    .into_iter()
    .map(|(real_entity_id, occurrence_id, owner_user, rule, status)| {
      Ok(PreservedLink {
        real_entity_id,
        occurrence_id,
        owner_user,
        rule,
        status: decode_status(&status)?,
      })
    })
    .collect()
}

/// Links are handled one at a time and re-read after each, since a merge
/// rewrites the real entity of preserved rows still waiting.
fn restore_links(conn: &mut Connection, source_id: &str, findings: &mut Findings) -> Result<()> {
  let mut kept: HashSet<(String, String)> = HashSet::new();

  loop {
    let next = load_preserved_links(conn, source_id)?
      .into_iter()
      .find(|l| !kept.contains(&(l.real_entity_id.clone(), l.occurrence_id.clone())));
    let Some(saved) = next else {
      break;
    };

    let keep = in_transaction(conn, |tx| restore_link(tx, &saved, findings))?;
    if keep {
      kept.insert((saved.real_entity_id, saved.occurrence_id));
    }
  }
  Ok(())
}

/// Restore one preserved link. Returns `true` when the shadow copy stays.
fn restore_link(tx: &Connection, saved: &PreservedLink, findings: &mut Findings) -> Result<bool> {
  let rid = &saved.real_entity_id;
  let occ = &saved.occurrence_id;

  if !entities::exists(tx, occ)? {
    findings.warnings.push(format!(
      "occurrence {occ} linked to {rid} by {} was not recreated; link kept as shadow",
      saved.owner_user
    ));
    return Ok(true);
  }

  tx.execute(
    "DELETE FROM preserved_links WHERE real_entity_id = ?1 AND occurrence_id = ?2",
    [rid, occ],
  )?;

  let Some(real) = resolve::get_real_entity(tx, rid)? else {
    findings.warnings.push(format!("real entity {rid} no longer exists; link to {occ} dropped"));
    return Ok(false);
  };

  let present = tx
    .query_row(
      "SELECT 1 FROM links WHERE real_entity_id = ?1 AND occurrence_id = ?2",
      [rid, occ],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if present {
    return Ok(false);
  }

  match resolve::link_for(tx, occ, &saved.owner_user)? {
    None => {
      tx.execute(
        "INSERT OR IGNORE INTO links (real_entity_id, occurrence_id, owner_user, rule, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![rid, occ, saved.owner_user, saved.rule, saved.status.to_string()],
      )?;
      debug!(real_id = %rid, occurrence = %occ, "link restored");
    }
    Some(current) => {
      let Some(other) = resolve::get_real_entity(tx, &current.real_entity_id)? else {
        return Ok(false);
      };
      let (winner, loser) = if other.status > real.status { (other, real) } else { (real, other) };
      resolve::merge_into(tx, &winner, &loser)?;
      findings.warnings.push(format!(
        "occurrence {occ} was re-identified as {}; merged {} into {}",
        current.real_entity_id, loser.id, winner.id
      ));
    }
  }
  Ok(false)
}

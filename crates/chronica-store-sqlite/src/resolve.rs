//! The entity resolution engine.
//!
//! All functions expect to run inside the caller's transaction, so each
//! public store operation commits all of its writes or none.

use chronica_core::{
  class,
  entity::Entity,
  resolution::{Link, RealEntity},
  store::Decision,
};
use rand_core::{OsRng, RngCore as _};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{ENTITY_COLUMNS, RawEntity, RawLink, RawRealEntity, encode_status},
  entities,
};

/// Digits in a generated real-entity id.
pub const REAL_ID_DIGITS: usize = 6;

const MAX_ATTEMPTS: usize = 100;

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn get_real_entity(conn: &Connection, id: &str) -> Result<Option<RealEntity>> {
  let raw = conn
    .query_row(
      &format!("{} WHERE r.id = ?1", RawRealEntity::SELECT),
      [id],
      RawRealEntity::from_row,
    )
    .optional()?;
  raw.map(RawRealEntity::into_real_entity).transpose()
}

fn require_real_entity(conn: &Connection, id: &str) -> Result<RealEntity> {
  get_real_entity(conn, id)?.ok_or_else(|| Error::RealEntityNotFound(id.to_owned()))
}

fn occurrence(conn: &Connection, id: &str) -> Result<Entity> {
  entities::get(conn, id)?.ok_or_else(|| Error::OccurrenceNotFound(id.to_owned()))
}

/// The link `user` holds for an occurrence, if any.
pub fn link_for(conn: &Connection, occurrence_id: &str, user: &str) -> Result<Option<Link>> {
  let raw = conn
    .query_row(
      &format!(
        "{} WHERE occurrence_id = ?1 AND owner_user = ?2 ORDER BY real_entity_id LIMIT 1",
        RawLink::SELECT
      ),
      [occurrence_id, user],
      RawLink::from_row,
    )
    .optional()?;
  raw.map(RawLink::into_link).transpose()
}

/// Every link of an occurrence, across users.
pub fn links_for(conn: &Connection, occurrence_id: &str) -> Result<Vec<Link>> {
  let mut stmt = conn.prepare(&format!(
    "{} WHERE occurrence_id = ?1 ORDER BY real_entity_id, owner_user",
    RawLink::SELECT
  ))?;
  let raws = stmt
    .query_map([occurrence_id], RawLink::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawLink::into_link).collect()
}

/// Occurrences linked to a real entity, ordered by id.
pub fn occurrences(conn: &Connection, real_id: &str) -> Result<Vec<Entity>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ENTITY_COLUMNS} FROM entities
     WHERE id IN (SELECT occurrence_id FROM links WHERE real_entity_id = ?1)
     ORDER BY id"
  ))?;
  let raws = stmt
    .query_map([real_id], RawEntity::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEntity::into_entity).collect()
}

// ─── Writes ──────────────────────────────────────────────────────────────────

fn create_real(
  conn: &Connection,
  id: &str,
  occ_category: &str,
  decision: &Decision,
) -> Result<RealEntity> {
  entities::insert_base(conn, &Entity::detached(id, class::REAL_ENTITY))?;
  conn.execute(
    "INSERT INTO real_entities (id, owner_user, status, occ_category) VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![id, decision.user, encode_status(decision.status), occ_category],
  )?;
  info!(real_id = id, user = %decision.user, status = %decision.status, "created real entity");
  require_real_entity(conn, id)
}

/// Link `occurrence_id` to `real_id` unless that pair is already linked.
fn ensure_link(
  conn: &Connection,
  real_id: &str,
  occurrence_id: &str,
  decision: &Decision,
) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO links (real_entity_id, occurrence_id, owner_user, rule, status)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      real_id,
      occurrence_id,
      decision.user,
      decision.rule,
      encode_status(decision.status)
    ],
  )?;
  Ok(())
}

/// The real entity a fresh identification of `occ` should use: the one named
/// by `decision.real_id` when it exists, otherwise a new one.
fn target(conn: &Connection, occ: &Entity, decision: &Decision) -> Result<RealEntity> {
  let Some(real_id) = decision.real_id.as_deref() else {
    let id = fresh_real_id(conn, &occ.category)?;
    return create_real(conn, &id, &occ.category, decision);
  };

  match get_real_entity(conn, real_id)? {
    Some(real) if real.occ_category == occ.category => Ok(real),
    Some(real) => Err(Error::CategoryMismatch {
      left:  real.occ_category,
      right: occ.category.clone(),
    }),
    None if entities::exists(conn, real_id)? => Err(Error::IdInUse(real_id.to_owned())),
    None => create_real(conn, real_id, &occ.category, decision),
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Declare that `a` and `b` denote the same real entity.
pub fn same_as(conn: &Connection, a: &str, b: &str, decision: &Decision) -> Result<RealEntity> {
  if a == b {
    return make_real(conn, a, decision);
  }

  let occ_a = occurrence(conn, a)?;
  let occ_b = occurrence(conn, b)?;
  if occ_a.category != occ_b.category {
    return Err(Error::CategoryMismatch { left: occ_a.category, right: occ_b.category });
  }

  let link_a = link_for(conn, a, &decision.user)?;
  let link_b = link_for(conn, b, &decision.user)?;

  match (link_a, link_b) {
    (None, None) => {
      let real = target(conn, &occ_a, decision)?;
      ensure_link(conn, &real.id, a, decision)?;
      ensure_link(conn, &real.id, b, decision)?;
      debug!(real_id = %real.id, a, b, "identified two unlinked occurrences");
      Ok(real)
    }

    (Some(link), None) | (None, Some(link)) => {
      let unlinked = if link.occurrence_id == a { b } else { a };
      check_requested(decision, &link.real_entity_id)?;
      let real = require_real_entity(conn, &link.real_entity_id)?;
      ensure_link(conn, &real.id, unlinked, decision)?;
      debug!(real_id = %real.id, occurrence = unlinked, "extended real entity");
      Ok(real)
    }

    (Some(la), Some(lb)) if la.real_entity_id == lb.real_entity_id => {
      check_requested(decision, &la.real_entity_id)?;
      require_real_entity(conn, &la.real_entity_id)
    }

    (Some(la), Some(lb)) => {
      if let Some(requested) = &decision.real_id {
        return Err(Error::RealIdConflict {
          requested: requested.clone(),
          existing:  la.real_entity_id,
        });
      }
      let ra = require_real_entity(conn, &la.real_entity_id)?;
      let rb = require_real_entity(conn, &lb.real_entity_id)?;
      let (winner, loser) = survivor(ra, rb);
      merge_into(conn, &winner, &loser)?;
      require_real_entity(conn, &winner.id)
    }
  }
}

fn check_requested(decision: &Decision, existing: &str) -> Result<()> {
  match decision.real_id.as_deref() {
    Some(requested) if requested != existing => Err(Error::RealIdConflict {
      requested: requested.to_owned(),
      existing:  existing.to_owned(),
    }),
    _ => Ok(()),
  }
}

/// Order two real entities as `(winner, loser)`: higher status first, then
/// the smaller id.
fn survivor(a: RealEntity, b: RealEntity) -> (RealEntity, RealEntity) {
  let a_first = match a.status.cmp(&b.status) {
    std::cmp::Ordering::Greater => true,
    std::cmp::Ordering::Less => false,
    std::cmp::Ordering::Equal => a.id <= b.id,
  };
  if a_first { (a, b) } else { (b, a) }
}

/// Move every link of `loser` to `winner` and delete `loser`.
pub(crate) fn merge_into(conn: &Connection, winner: &RealEntity, loser: &RealEntity) -> Result<()> {
  conn.execute(
    "DELETE FROM links WHERE real_entity_id = ?2
       AND occurrence_id IN (SELECT occurrence_id FROM links WHERE real_entity_id = ?1)",
    [&winner.id, &loser.id],
  )?;
  let moved = conn.execute(
    "UPDATE links SET real_entity_id = ?1 WHERE real_entity_id = ?2",
    [&winner.id, &loser.id],
  )?;
  conn.execute(
    "UPDATE OR IGNORE preserved_links SET real_entity_id = ?1 WHERE real_entity_id = ?2",
    [&winner.id, &loser.id],
  )?;
  conn.execute("DELETE FROM preserved_links WHERE real_entity_id = ?1", [&loser.id])?;
  conn.execute(
    "UPDATE real_entities
     SET description = COALESCE(description, (SELECT description FROM real_entities WHERE id = ?2))
     WHERE id = ?1",
    [&winner.id, &loser.id],
  )?;
  entities::delete(conn, &loser.id)?;
  info!(winner = %winner.id, loser = %loser.id, moved, "merged real entities");
  Ok(())
}

/// Make `occurrence_id` into a real entity, or return the one `user` already
/// linked it to.
pub fn make_real(conn: &Connection, occurrence_id: &str, decision: &Decision) -> Result<RealEntity> {
  let occ = occurrence(conn, occurrence_id)?;
  if let Some(link) = link_for(conn, occurrence_id, &decision.user)? {
    check_requested(decision, &link.real_entity_id)?;
    return require_real_entity(conn, &link.real_entity_id);
  }
  let real = target(conn, &occ, decision)?;
  ensure_link(conn, &real.id, occurrence_id, decision)?;
  Ok(real)
}

/// Bind an occurrence to an existing real entity.
pub fn attach_occurrence(
  conn: &Connection,
  real_id: &str,
  occurrence_id: &str,
  decision: &Decision,
) -> Result<Link> {
  let real = require_real_entity(conn, real_id)?;
  let occ = occurrence(conn, occurrence_id)?;
  if occ.category != real.occ_category {
    return Err(Error::CategoryMismatch { left: real.occ_category, right: occ.category });
  }

  let already = links_for(conn, occurrence_id)?
    .into_iter()
    .find(|l| l.real_entity_id == real_id || l.owner_user == decision.user);
  if let Some(link) = already {
    return Err(Error::AlreadyLinked {
      occurrence: occurrence_id.to_owned(),
      real_id:    link.real_entity_id,
    });
  }

  ensure_link(conn, real_id, occurrence_id, decision)?;
  Ok(Link {
    real_entity_id: real_id.to_owned(),
    occurrence_id:  occurrence_id.to_owned(),
    rule:           decision.rule.clone(),
    owner_user:     decision.user.clone(),
    status:         decision.status,
  })
}

/// Delete a real entity; its links go with it.
pub fn delete(conn: &Connection, real_id: &str, silent: bool) -> Result<Option<RealEntity>> {
  match get_real_entity(conn, real_id)? {
    None if silent => Ok(None),
    None => Err(Error::RealEntityNotFound(real_id.to_owned())),
    Some(real) => {
      conn.execute("DELETE FROM preserved_links WHERE real_entity_id = ?1", [real_id])?;
      entities::delete(conn, real_id)?;
      info!(real_id, "deleted real entity");
      Ok(Some(real))
    }
  }
}

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// Random `length`-digit string not used as an entity id.
pub fn generate_id(conn: &Connection, length: usize) -> Result<String> {
  generate(conn, "", length)
}

/// A new real-entity id such as `rp-048213` for a `person` occurrence.
fn fresh_real_id(conn: &Connection, occ_category: &str) -> Result<String> {
  let initial = occ_category.chars().next().map_or('x', |c| c.to_ascii_lowercase());
  generate(conn, &format!("r{initial}-"), REAL_ID_DIGITS)
}

fn generate(conn: &Connection, prefix: &str, length: usize) -> Result<String> {
  if length == 0 {
    return Err(Error::ZeroLengthId);
  }
  for _ in 0..MAX_ATTEMPTS {
    let digits: String = (0..length)
      .map(|_| char::from(b'0' + (OsRng.next_u32() % 10) as u8))
      .collect();
    let candidate = format!("{prefix}{digits}");
    if !entities::exists(conn, &candidate)? {
      return Ok(candidate);
    }
  }
  Err(Error::IdSpaceExhausted(MAX_ATTEMPTS))
}

#[cfg(test)]
mod tests {
  use chronica_core::resolution::Status;

  use super::*;

  fn real(id: &str, status: Status) -> RealEntity {
    RealEntity {
      id: id.into(),
      owner_user: "u".into(),
      description: None,
      status,
      occ_category: "person".into(),
      obs: None,
      updated_at: None,
    }
  }

  #[test]
  fn higher_status_survives() {
    let (winner, loser) = survivor(real("ra", Status::Automatic), real("rb", Status::Manual));
    assert_eq!(winner.id, "rb");
    assert_eq!(loser.id, "ra");
  }

  #[test]
  fn ties_keep_the_smaller_id_whatever_the_order() {
    let (w1, _) = survivor(real("rp-2", Status::Source), real("rp-1", Status::Source));
    let (w2, _) = survivor(real("rp-1", Status::Source), real("rp-2", Status::Source));
    assert_eq!(w1.id, "rp-1");
    assert_eq!(w2.id, "rp-1");
  }

  #[test]
  fn zero_digit_ids_are_refused() {
    let conn = Connection::open_in_memory().unwrap();
    assert!(matches!(generate_id(&conn, 0), Err(Error::ZeroLengthId)));
  }

  #[test]
  fn exhausted_id_space_is_reported() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch("CREATE TABLE entities (id TEXT PRIMARY KEY, category TEXT)")
      .unwrap();
    for d in 0..10 {
      conn
        .execute("INSERT INTO entities VALUES (?1, 'x')", [d.to_string()])
        .unwrap();
    }
    assert!(matches!(generate_id(&conn, 1), Err(Error::IdSpaceExhausted(100))));
  }
}

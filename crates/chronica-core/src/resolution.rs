//! Entity-resolution vocabulary: real entities, the links binding
//! occurrences to them, and the priority order of link statuses.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// How authoritative a real entity or link is.
///
/// The declared variant order is the priority order used when two real
/// entities are merged; the stored text form plays no part in comparisons.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
  #[default]
  Unlinked,
  /// Proposed by an automatic matching rule.
  Automatic,
  /// Asserted inside a transcription ("same as" meta-relations).
  Source,
  /// Decided by a user.
  Manual,
  /// Reviewed and confirmed.
  Valid,
  /// Carried over from an earlier system.
  Legacy,
}

impl Status {
  /// Parse the stored text form.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownStatus(s.to_owned()))
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// The deduplicated identity that one or more occurrences are believed to
/// represent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealEntity {
  pub id:           String,
  pub owner_user:   String,
  pub description:  Option<String>,
  pub status:       Status,
  /// Category shared by every occurrence bound to this entity.
  pub occ_category: String,
  pub obs:          Option<String>,
  pub updated_at:   Option<DateTime<Utc>>,
}

/// Binding of one occurrence to one real entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  pub real_entity_id: String,
  pub occurrence_id:  String,
  /// Free-text provenance of the decision that created the link.
  pub rule:           Option<String>,
  pub owner_user:     String,
  pub status:         Status,
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn priority_follows_declaration_order() {
    let ordered: Vec<Status> = Status::iter().collect();
    let mut sorted = ordered.clone();
    sorted.sort();
    assert_eq!(ordered, sorted);
    assert!(Status::Manual > Status::Automatic);
    assert!(Status::Legacy > Status::Valid);
  }

  #[test]
  fn stored_form_is_lowercase_name() {
    assert_eq!(Status::Source.to_string(), "source");
    assert_eq!(Status::parse("legacy").unwrap(), Status::Legacy);
  }

  #[test]
  fn unknown_marker_is_rejected() {
    assert!(matches!(Status::parse("5"), Err(Error::UnknownStatus(_))));
  }
}

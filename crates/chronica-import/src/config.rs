//! Runner configuration, deserialised from `chronica.toml` and `CHRONICA_*`
//! environment variables.

use std::path::{Path, PathBuf};

use chronica_core::{import::ImportOptions, resolution::Status};
use serde::Deserialize;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
  #[serde(default = "default_store_path")]
  pub store_path:     PathBuf,
  /// User recorded on links created by "same as" meta-relations.
  #[serde(default = "default_user")]
  pub user:           String,
  #[serde(default)]
  pub same_as_status: Option<Status>,
}

fn default_store_path() -> PathBuf { PathBuf::from("chronica.db") }

fn default_user() -> String { ImportOptions::default().user }

impl ImportConfig {
  pub fn options(&self) -> ImportOptions {
    let defaults = ImportOptions::default();
    ImportOptions {
      user:           self.user.clone(),
      same_as_status: self.same_as_status.unwrap_or(defaults.same_as_status),
    }
  }

  /// Store path with a leading `~/` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  match (s.strip_prefix("~/"), std::env::var("HOME")) {
    (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(toml: &str) -> ImportConfig {
    ::config::Config::builder()
      .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.store_path, PathBuf::from("chronica.db"));
    let options = cfg.options();
    assert_eq!(options.user, "import");
    assert_eq!(options.same_as_status, Status::Source);
  }

  #[test]
  fn status_is_read_in_lowercase() {
    let cfg = parse("user = \"ana\"\nsame_as_status = \"manual\"\n");
    let options = cfg.options();
    assert_eq!(options.user, "ana");
    assert_eq!(options.same_as_status, Status::Manual);
  }

  #[test]
  fn only_a_leading_tilde_is_expanded() {
    assert_eq!(expand_tilde(Path::new("/data/c.db")), PathBuf::from("/data/c.db"));
    assert_eq!(expand_tilde(Path::new("a/~/c.db")), PathBuf::from("a/~/c.db"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/c.db")), PathBuf::from(home).join("c.db"));
    }
  }
}

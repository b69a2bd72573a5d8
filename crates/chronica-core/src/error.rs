//! Error types for `chronica-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown status marker: {0:?}")]
  UnknownStatus(String),

  #[error("unknown column type: {0:?}")]
  UnknownColumnType(String),

  #[error("invalid class descriptor {class:?}: {reason}")]
  InvalidDescriptor { class: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! SQLite backend for the Chronica transcription store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Everything below [`SqliteStore`] is
//! synchronous code operating on a borrowed [`rusqlite::Connection`]; the
//! store moves each call onto the connection thread as one closure.

mod catalogue;
mod crossref;
mod db;
mod encode;
mod entities;
mod import;
mod mapping;
mod resolve;
mod schema;
mod status;
mod store;

pub mod error;
pub mod synth;

pub use error::{Error, Result};
pub use store::SqliteStore;
pub use synth::SchemaCache;

#[cfg(test)]
mod tests;

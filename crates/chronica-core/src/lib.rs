//! Core types and trait definitions for the Chronica transcription store.
//!
//! This crate is deliberately free of database dependencies. It defines the
//! entity/row model, class descriptors, the entity-resolution vocabulary, the
//! event stream produced by the upstream translator, and the state machine
//! that validates that stream before any storage backend sees it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod class;
pub mod entity;
pub mod error;
pub mod event;
pub mod import;
pub mod ingest;
pub mod resolution;
pub mod store;

pub use error::{Error, Result};

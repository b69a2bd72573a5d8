//! [`SqliteStore`], the SQLite implementation of [`EntityStore`].

use std::{
  path::Path,
  sync::{Arc, Mutex},
};

use chronica_core::{
  class::{ClassDescriptor, ResolvedClass},
  entity::{Entity, EntityRecord, Relation},
  event::Event,
  import::{ImportOptions, ImportStats, ImportStatus},
  ingest::EventParser,
  resolution::{Link, RealEntity},
  store::{Decision, EntityStore},
};
use rusqlite::Connection;

use crate::{
  Error, Result,
  db::in_transaction,
  entities,
  import::Importer,
  resolve,
  schema::SCHEMA,
  status,
  synth::{self, SchemaCache},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Chronica store backed by a single SQLite file.
///
/// Cloning is cheap: the connection and the schema cache are shared, so every
/// clone sees the classes any other clone has synthesized.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  cache: Arc<Mutex<SchemaCache>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, cache: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, cache: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .with_conn(|conn, cache| {
        conn.execute_batch(SCHEMA)?;
        in_transaction(conn, |tx| synth::bootstrap(tx, cache))
      })
      .await
  }

  /// Run `f` on the connection thread with the schema cache locked.
  pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection, &mut SchemaCache) -> Result<T> + Send + 'static,
  {
    let cache = Arc::clone(&self.cache);
    self
      .conn
      .call(move |conn| {
        let result = match cache.lock() {
          Ok(mut cache) => f(conn, &mut *cache),
          Err(_) => Err(Error::LockPoisoned),
        };
        Ok(result)
      })
      .await?
  }

  /// Run a resolution step as one transaction.
  async fn resolution<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.with_conn(move |conn, _| in_transaction(conn, f)).await
  }
}

// ─── EntityStore impl ────────────────────────────────────────────────────────

impl EntityStore for SqliteStore {
  type Error = Error;

  // ── Ingestion ─────────────────────────────────────────────────────────────

  async fn import_file(&self, events: Vec<Event>, options: ImportOptions) -> Result<ImportStats> {
    let files = events.iter().filter(|e| matches!(e, Event::FileStart(_))).count();
    if files > 1 {
      return Err(Error::SeveralFilesInStream(files));
    }
    self
      .import_stream(events, options)
      .await?
      .into_iter()
      .next()
      .ok_or(Error::NoFileInStream)
  }

  async fn import_stream(
    &self,
    events: Vec<Event>,
    options: ImportOptions,
  ) -> Result<Vec<ImportStats>> {
    self
      .with_conn(move |conn, cache| {
        let mut importer = Importer::new(conn, cache, options);
        EventParser::new().drive(events, &mut importer)?;
        Ok(importer.into_stats())
      })
      .await
  }

  async fn import_status(&self, path: &str) -> Result<Option<ImportStatus>> {
    let path = path.to_owned();
    self.with_conn(move |conn, _| status::read(conn, &path)).await
  }

  // ── Schema ────────────────────────────────────────────────────────────────

  async fn ensure_mapping(&self, descriptor: ClassDescriptor) -> Result<ResolvedClass> {
    self
      .with_conn(move |conn, cache| {
        let mut staged = cache.clone();
        let resolved = in_transaction(conn, |tx| synth::ensure_mapping(tx, &mut staged, descriptor))?;
        *cache = staged;
        Ok(ResolvedClass::clone(&resolved))
      })
      .await
  }

  async fn resolve_category(&self, category: &str) -> Result<ResolvedClass> {
    let category = category.to_owned();
    self
      .with_conn(move |conn, cache| {
        let resolved = synth::resolve_category(conn, cache, &category)?;
        Ok(ResolvedClass::clone(&resolved))
      })
      .await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_entity(&self, id: &str) -> Result<Option<EntityRecord>> {
    let id = id.to_owned();
    self.with_conn(move |conn, cache| entities::get_record(conn, cache, &id)).await
  }

  async fn get_relation(&self, id: &str) -> Result<Option<Relation>> {
    Ok(self.get_entity(id).await?.as_ref().and_then(Relation::from_record))
  }

  async fn get_real_entity(&self, id: &str) -> Result<Option<RealEntity>> {
    let id = id.to_owned();
    self.with_conn(move |conn, _| resolve::get_real_entity(conn, &id)).await
  }

  async fn get_occurrences(&self, real_id: &str) -> Result<Vec<Entity>> {
    let real_id = real_id.to_owned();
    self.with_conn(move |conn, _| resolve::occurrences(conn, &real_id)).await
  }

  async fn links_for(&self, occurrence_id: &str) -> Result<Vec<Link>> {
    let occurrence_id = occurrence_id.to_owned();
    self.with_conn(move |conn, _| resolve::links_for(conn, &occurrence_id)).await
  }

  // ── Resolution ────────────────────────────────────────────────────────────

  async fn same_as(&self, occ_a: &str, occ_b: &str, decision: Decision) -> Result<RealEntity> {
    let (a, b) = (occ_a.to_owned(), occ_b.to_owned());
    self.resolution(move |tx| resolve::same_as(tx, &a, &b, &decision)).await
  }

  async fn make_real(&self, occurrence_id: &str, decision: Decision) -> Result<RealEntity> {
    let occurrence_id = occurrence_id.to_owned();
    self.resolution(move |tx| resolve::make_real(tx, &occurrence_id, &decision)).await
  }

  async fn attach_occurrence(
    &self,
    real_id: &str,
    occurrence_id: &str,
    decision: Decision,
  ) -> Result<Link> {
    let (real_id, occurrence_id) = (real_id.to_owned(), occurrence_id.to_owned());
    self
      .resolution(move |tx| resolve::attach_occurrence(tx, &real_id, &occurrence_id, &decision))
      .await
  }

  async fn delete_real_entity(&self, real_id: &str, silent: bool) -> Result<Option<RealEntity>> {
    let real_id = real_id.to_owned();
    self.resolution(move |tx| resolve::delete(tx, &real_id, silent)).await
  }

  async fn generate_id(&self, length: usize) -> Result<String> {
    self.with_conn(move |conn, _| resolve::generate_id(conn, length)).await
  }
}

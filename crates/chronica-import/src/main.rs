//! chronica-import batch runner.
//!
//! Reads `chronica.toml` (or the path specified with `--config`), opens the
//! SQLite store, and imports each JSON-lines event file given on the command
//! line. One line holds one event, e.g.
//!
//! ```text
//! {"event":"file_start","path":"b1688.cli","structure":"gacto2.str","translator":"kleio"}
//! {"event":"group_opened","id":"b1688-p1","name":"n","line":12}
//! ```

mod config;

use std::{
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use chronica_core::{event::Event, store::EntityStore};
use chronica_store_sqlite::SqliteStore;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ImportConfig;

#[derive(Parser)]
#[command(author, version, about = "Chronica batch importer")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "chronica.toml")]
  config: PathBuf,

  /// Translated event files (JSON lines) to import, in order.
  #[arg(required = true)]
  files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = ::config::Config::builder()
    .add_source(::config::File::from(cli.config).required(false))
    .add_source(::config::Environment::with_prefix("CHRONICA"))
    .build()
    .context("failed to read config file")?;

  let import_cfg: ImportConfig = settings
    .try_deserialize()
    .context("failed to deserialise ImportConfig")?;

  let store_path = import_cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let options = import_cfg.options();
  let mut failed = 0usize;
  for path in &cli.files {
    let events = read_events(path)?;
    let stats = store
      .import_stream(events, options.clone())
      .await
      .with_context(|| format!("import of {path:?} failed"))?;

    for file in &stats {
      if file.is_clean() {
        info!(path = %file.path, entities = file.entity_count, warnings = file.warnings.len(), "ok");
      } else {
        failed += 1;
        warn!(
          path = %file.path,
          errors = file.errors.len(),
          aborted = file.aborted,
          "imported with errors"
        );
      }
    }
  }

  if failed > 0 {
    anyhow::bail!("{failed} file(s) imported with errors; see the import status records");
  }
  Ok(())
}

/// Parse a JSON-lines event file.
fn read_events(path: &Path) -> anyhow::Result<Vec<Event>> {
  let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
  serde_json::Deserializer::from_reader(BufReader::new(file))
    .into_iter::<Event>()
    .collect::<Result<Vec<_>, _>>()
    .with_context(|| format!("malformed event in {path:?}"))
}

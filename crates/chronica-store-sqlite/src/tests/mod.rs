//! Integration tests for `SqliteStore` against an in-memory database.

use chronica_core::{
  event::{ElementHeader, Event, FileHeader, GroupHeader},
  import::{ImportOptions, ImportStats},
  store::EntityStore,
};

use crate::SqliteStore;

mod schema;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Event builders ──────────────────────────────────────────────────────────

fn header(path: &str) -> FileHeader {
  FileHeader {
    path:          path.into(),
    name:          None,
    structure:     "gacto2.str".into(),
    translator:    "kleio".into(),
    translated_at: None,
  }
}

/// A whole file: header, body, end.
fn file(path: &str, body: Vec<Event>) -> Vec<Event> {
  let mut events = vec![Event::FileStart(header(path))];
  events.extend(body);
  events.push(Event::FileEnd);
  events
}

/// A group whose elements are `(name, class, value)` triples.
fn group(id: &str, name: &str, line: i64, elements: &[(&str, &str, &str)]) -> Vec<Event> {
  let mut events = vec![Event::GroupOpened(GroupHeader {
    id: id.into(),
    name: name.into(),
    category_hint: None,
    order: line,
    level: 1,
    line,
  })];
  for (name, class, value) in elements {
    events.push(Event::ElementOpened(ElementHeader {
      name:  (*name).into(),
      class: (*class).into(),
    }));
    events.push(Event::CoreValue { text: (*value).into() });
    events.push(Event::ElementClosed);
  }
  events.push(Event::GroupClosed);
  events
}

fn source(id: &str) -> Vec<Event> {
  group(id, "source", 1, &[("type", "type", "baptisms"), ("loc", "loc", "arq")])
}

fn person(id: &str, name: &str, inside: &str) -> Vec<Event> {
  group(id, "person", 2, &[("name", "name", name), ("inside", "inside", inside)])
}

fn relation(id: &str, inside: &str, origin: &str, destination: &str) -> Vec<Event> {
  group(id, "relation", 3, &[
    ("inside", "inside", inside),
    ("origin", "origin", origin),
    ("destination", "destination", destination),
    ("type", "type", "parentesco"),
    ("value", "value", "pai"),
  ])
}

/// Import one source `s1` holding a person for each id.
async fn seed_persons(s: &SqliteStore, ids: &[&str]) -> ImportStats {
  let mut body = source("s1");
  for id in ids {
    body.extend(person(id, &format!("Person {id}"), "s1"));
  }
  let stats = s
    .import_file(file("seed.cli", body), ImportOptions::default())
    .await
    .unwrap();
  assert!(stats.is_clean(), "seed import failed: {:?}", stats.errors);
  stats
}

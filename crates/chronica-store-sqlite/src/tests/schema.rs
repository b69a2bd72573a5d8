use chronica_core::{
  class::{ClassDescriptor, ClassMapping, ColumnDescriptor},
  entity::Value,
  event::Event,
  import::ImportOptions,
  store::EntityStore,
};

use super::{file, group, source, store};
use crate::{Error, SqliteStore};

fn mapping(id: &str, table: &str, group: &str, super_class: Option<&str>) -> ClassMapping {
  ClassMapping {
    id:          id.into(),
    table_name:  table.into(),
    group_name:  group.into(),
    super_class: super_class.map(Into::into),
  }
}

fn witness() -> ClassDescriptor {
  ClassDescriptor::new(mapping("witness", "witnesses", "wit", Some("person")), vec![
    ColumnDescriptor::text("age", 0).numeric(3, 0),
    ColumnDescriptor::text("role", 32),
  ])
}

async fn tables_named(s: &SqliteStore, table: &str) -> i64 {
  let table = table.to_owned();
  s.with_conn(move |conn, _| {
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
      [&table],
      |r| r.get(0),
    )?;
    Ok(count)
  })
  .await
  .unwrap()
}

#[tokio::test]
async fn builtin_categories_resolve_after_open() {
  let s = store().await;

  let person = s.resolve_category("person").await.unwrap();
  assert_eq!(person.table(), "persons");
  assert_eq!(person.lineage, ["entity", "person"]);
  assert!(person.table_columns.iter().any(|c| c == "name"));

  let err = s.resolve_category("marriage").await.unwrap_err();
  assert!(matches!(err, Error::UnknownCategory(_)), "got {err}");
}

#[tokio::test]
async fn same_descriptor_twice_yields_one_table() {
  let s = store().await;

  let first = s.ensure_mapping(witness()).await.unwrap();
  let second = s.ensure_mapping(witness()).await.unwrap();

  assert_eq!(first.table_columns, second.table_columns);
  assert_eq!(first.table_columns, ["id", "age", "role"]);
  assert_eq!(first.lineage, ["entity", "person", "witness"]);
  assert_eq!(tables_named(&s, "witnesses").await, 1);
}

#[tokio::test]
async fn redefinition_adds_missing_columns() {
  let s = store().await;
  s.ensure_mapping(witness()).await.unwrap();

  let mut wider = witness();
  wider.columns.push(ColumnDescriptor::text("parish", 64));
  let resolved = s.ensure_mapping(wider).await.unwrap();

  assert_eq!(resolved.table_columns, ["id", "age", "role", "parish"]);
  let reloaded = s.resolve_category("witness").await.unwrap();
  assert_eq!(reloaded.descriptor.columns.len(), 4);
}

#[tokio::test]
async fn unknown_superclass_is_rejected() {
  let s = store().await;
  let orphan = ClassDescriptor::new(
    mapping("godparent", "godparents", "pad", Some("sponsor")),
    vec![ColumnDescriptor::text("name", 64)],
  );

  let err = s.ensure_mapping(orphan).await.unwrap_err();
  assert!(matches!(err, Error::UnknownSuperClass { .. }), "got {err}");
  assert_eq!(tables_named(&s, "godparents").await, 0);
}

#[tokio::test]
async fn unsafe_identifiers_are_rejected() {
  let s = store().await;
  let hostile = ClassDescriptor::new(
    mapping("evil", "evil; DROP TABLE entities", "ev", Some("object")),
    vec![],
  );

  let err = s.ensure_mapping(hostile).await.unwrap_err();
  assert!(matches!(err, Error::InvalidIdentifier(_)), "got {err}");
  assert!(s.resolve_category("evil").await.is_err());
}

#[tokio::test]
async fn protected_class_redefinition_keeps_the_builtin_table() {
  let s = store().await;

  let mut body = Event::class_defined(ClassDescriptor::new(
    mapping("person", "people", "n", Some("entity")),
    vec![ColumnDescriptor::text("name", 200), ColumnDescriptor::text("nickname", 64)],
  ));
  body.extend(source("s1"));
  body.extend(group("p9", "n", 4, &[("nome", "name", "Maria"), ("inside", "inside", "s1")]));

  let stats = s.import_file(file("n.cli", body), ImportOptions::default()).await.unwrap();
  assert!(stats.errors.is_empty(), "{:?}", stats.errors);

  assert_eq!(s.resolve_category("person").await.unwrap().table(), "persons");
  assert_eq!(tables_named(&s, "people").await, 0);

  let record = s.get_entity("p9").await.unwrap().unwrap();
  assert_eq!(record.entity.category, "person");
  assert_eq!(record.entity.group_name.as_deref(), Some("n"));
  assert_eq!(record.attributes.text("name"), Some("Maria"));
}

#[tokio::test]
async fn subclass_rows_span_the_lineage() {
  let s = store().await;

  let mut body = Event::class_defined(witness());
  body.extend(source("s1"));
  body.extend(group("w1", "wit", 5, &[
    ("nome", "name", "Joana"),
    ("idade", "age", " 40 "),
    ("inside", "inside", "s1"),
  ]));

  let stats = s.import_file(file("w.cli", body), ImportOptions::default()).await.unwrap();
  assert!(stats.is_clean(), "{:?}", stats.errors);

  let record = s.get_entity("w1").await.unwrap().unwrap();
  assert_eq!(record.entity.category, "witness");
  assert_eq!(record.entity.container_id.as_deref(), Some("s1"));
  assert_eq!(record.attributes.text("name"), Some("Joana"));
  assert_eq!(record.attributes.get("age"), Some(&Value::Integer(40)));
  assert!(!record.attributes.contains("id"));
}

#[tokio::test]
async fn subclass_sharing_its_parent_table_stores_extra_columns() {
  let s = store().await;

  let mut body = Event::class_defined(ClassDescriptor::new(
    mapping("lugar_n", "persons", "n", Some("person")),
    vec![ColumnDescriptor::text("alcunha", 64).with_class("nickname")],
  ));
  body.extend(source("s1"));
  body.extend(group("p9", "n", 4, &[
    ("nome", "name", "Maria"),
    ("alcunha", "nickname", "a Ruiva"),
    ("inside", "inside", "s1"),
  ]));

  let stats = s.import_file(file("n.cli", body), ImportOptions::default()).await.unwrap();
  assert!(stats.is_clean(), "{:?} {:?}", stats.errors, stats.warnings);
  assert!(stats.warnings.is_empty(), "{:?}", stats.warnings);

  let class = s.resolve_category("lugar_n").await.unwrap();
  assert_eq!(class.table(), "persons");
  assert!(class.table_columns.iter().any(|c| c == "alcunha"));

  let record = s.get_entity("p9").await.unwrap().unwrap();
  assert_eq!(record.entity.category, "lugar_n");
  assert_eq!(record.attributes.text("name"), Some("Maria"));
  assert_eq!(record.attributes.text("alcunha"), Some("a Ruiva"));
}

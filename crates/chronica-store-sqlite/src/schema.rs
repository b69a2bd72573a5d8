//! SQL schema for the static part of the Chronica SQLite store.
//!
//! Category tables created from transcriptions are not listed here; the
//! schema synthesizer adds them at import time. Every extension table keys on
//! `id` and cascades deletes from its superclass table, ending at
//! `entities`.

/// Full static DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per stored thing, whatever its category. Ids share one namespace.
CREATE TABLE IF NOT EXISTS entities (
    id            VARCHAR(64) PRIMARY KEY,
    category      VARCHAR(64) NOT NULL,
    container_id  VARCHAR(64) REFERENCES entities(id) ON DELETE CASCADE,
    entity_order  INTEGER NOT NULL DEFAULT 0,
    nesting_level INTEGER NOT NULL DEFAULT 0,
    source_line   INTEGER NOT NULL DEFAULT 0,
    group_name    VARCHAR(32),
    updated_at    TEXT,             -- RFC 3339 UTC
    indexed_at    TEXT
);

CREATE INDEX IF NOT EXISTS entities_container_idx ON entities(container_id);
CREATE INDEX IF NOT EXISTS entities_category_idx  ON entities(category);

CREATE TABLE IF NOT EXISTS classes (
    id          VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    table_name  VARCHAR(64) NOT NULL,
    group_name  VARCHAR(32) NOT NULL,
    super_class VARCHAR(64)         -- NULL for a hierarchy root
);

CREATE INDEX IF NOT EXISTS classes_group_idx ON classes(group_name);

CREATE TABLE IF NOT EXISTS class_attributes (
    class_id         VARCHAR(64) NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
    position         INTEGER NOT NULL,
    name             VARCHAR(64) NOT NULL,
    column_name      VARCHAR(64) NOT NULL,
    column_class     VARCHAR(64) NOT NULL,
    column_type      VARCHAR(16) NOT NULL,   -- 'varchar' | 'numeric' | 'text'
    size             INTEGER NOT NULL DEFAULT 0,
    precision_digits INTEGER NOT NULL DEFAULT 0,
    primary_key_rank INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (class_id, column_name)
);

CREATE TABLE IF NOT EXISTS relations (
    id          VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    origin      VARCHAR(64) NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    -- Nulled, not cascaded: cross-file restoration puts it back.
    destination VARCHAR(64) REFERENCES entities(id) ON DELETE SET NULL,
    rel_type    VARCHAR(32),
    rel_value   VARCHAR(64),
    rel_date    VARCHAR(24),
    obs         TEXT
);

CREATE INDEX IF NOT EXISTS relations_origin_idx      ON relations(origin);
CREATE INDEX IF NOT EXISTS relations_destination_idx ON relations(destination);

CREATE TABLE IF NOT EXISTS attributes (
    id         VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    entity     VARCHAR(64) NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    attr_type  VARCHAR(512),
    attr_value VARCHAR(1024),
    attr_date  VARCHAR(24),
    obs        TEXT
);

CREATE INDEX IF NOT EXISTS attributes_entity_idx ON attributes(entity);

CREATE TABLE IF NOT EXISTS sources (
    id           VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    source_type  VARCHAR(32),
    source_date  VARCHAR(24),
    loc          VARCHAR(64),
    ref          VARCHAR(64),
    source_file  VARCHAR(256),
    replace_mode VARCHAR(24),
    obs          TEXT
);

CREATE TABLE IF NOT EXISTS acts (
    id       VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    act_type VARCHAR(32),
    act_date VARCHAR(24),
    loc      VARCHAR(64),
    ref      VARCHAR(64),
    obs      TEXT
);

CREATE TABLE IF NOT EXISTS persons (
    id   VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    name VARCHAR(128),
    sex  VARCHAR(1),
    obs  TEXT
);

CREATE TABLE IF NOT EXISTS objects (
    id          VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    name        VARCHAR(128),
    object_type VARCHAR(32),
    obs         TEXT
);

CREATE TABLE IF NOT EXISTS geoentities (
    id       VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    name     VARCHAR(128),
    geo_type VARCHAR(32),
    obs      TEXT
);

CREATE TABLE IF NOT EXISTS real_entities (
    id           VARCHAR(64) PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    owner_user   VARCHAR(32) NOT NULL,
    description  TEXT,
    status       VARCHAR(16) NOT NULL,   -- lowercase Status variant
    occ_category VARCHAR(64) NOT NULL,
    obs          TEXT
);

-- Occurrence ↔ real entity bindings.
CREATE TABLE IF NOT EXISTS links (
    real_entity_id VARCHAR(64) NOT NULL REFERENCES real_entities(id) ON DELETE CASCADE,
    occurrence_id  VARCHAR(64) NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    owner_user     VARCHAR(32) NOT NULL,
    rule           TEXT,
    status         VARCHAR(16) NOT NULL,
    PRIMARY KEY (real_entity_id, occurrence_id)
);

CREATE INDEX IF NOT EXISTS links_occurrence_idx ON links(occurrence_id, owner_user);

-- One row per imported path, replaced on every import.
CREATE TABLE IF NOT EXISTS import_status (
    path           TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    structure      TEXT NOT NULL,
    translator     TEXT NOT NULL,
    translated_at  TEXT,
    error_count    INTEGER NOT NULL DEFAULT 0,
    warning_count  INTEGER NOT NULL DEFAULT 0,
    error_report   TEXT NOT NULL DEFAULT '',
    warning_report TEXT NOT NULL DEFAULT '',
    imported_at    TEXT             -- NULL while an import is in progress
);

-- Relations from outside a source that point into it, saved before the
-- source is deleted for re-import. No foreign keys: the targets are about
-- to disappear.
CREATE TABLE IF NOT EXISTS preserved_relations (
    relation_id VARCHAR(64) PRIMARY KEY,
    source_id   VARCHAR(64) NOT NULL,
    origin      VARCHAR(64) NOT NULL,
    destination VARCHAR(64) NOT NULL,
    rel_type    VARCHAR(32),
    rel_value   VARCHAR(64),
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS preserved_relations_source_idx ON preserved_relations(source_id);

-- Shadow copies of links whose occurrence lives inside a re-imported source.
CREATE TABLE IF NOT EXISTS preserved_links (
    real_entity_id VARCHAR(64) NOT NULL,
    occurrence_id  VARCHAR(64) NOT NULL,
    owner_user     VARCHAR(32) NOT NULL,
    rule           TEXT,
    status         VARCHAR(16) NOT NULL,
    source_id      VARCHAR(64) NOT NULL,
    captured_at    TEXT NOT NULL,
    PRIMARY KEY (real_entity_id, occurrence_id)
);

CREATE INDEX IF NOT EXISTS preserved_links_source_idx ON preserved_links(source_id);

PRAGMA user_version = 1;
";

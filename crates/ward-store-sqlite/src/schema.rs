//! SQL schema for the Ward SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS locations (
    location_uuid TEXT PRIMARY KEY,
    parent_uuid   TEXT               -- NULL for the root
);

CREATE TABLE IF NOT EXISTS location_names (
    location_uuid TEXT NOT NULL,
    locale        TEXT NOT NULL,
    name          TEXT NOT NULL,
    UNIQUE (location_uuid, locale)
);

CREATE TABLE IF NOT EXISTS concepts (
    uuid         TEXT PRIMARY KEY,
    xform_id     INTEGER NOT NULL,
    concept_type TEXT NOT NULL      -- 'NUMERIC' | 'TEXT' | 'CODED' | ...
);

CREATE TABLE IF NOT EXISTS concept_names (
    concept_uuid TEXT NOT NULL,
    locale       TEXT NOT NULL,
    name         TEXT NOT NULL,
    UNIQUE (concept_uuid, locale)
);

-- Sections have a section_type and no parent_id; items point at the row id of
-- their section. AUTOINCREMENT keeps ids increasing across replacements so
-- that id order is insertion order.
CREATE TABLE IF NOT EXISTS chart_items (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    chart_uuid     TEXT NOT NULL,
    weight         INTEGER NOT NULL,
    section_type   TEXT,
    parent_id      INTEGER,
    label          TEXT NOT NULL,
    type           TEXT,
    required       INTEGER NOT NULL DEFAULT 0,
    concept_uuids  TEXT NOT NULL DEFAULT '',  -- comma-separated
    format         TEXT,
    caption_format TEXT
);

CREATE TABLE IF NOT EXISTS patients (
    uuid          TEXT PRIMARY KEY,
    given_name    TEXT NOT NULL,
    family_name   TEXT NOT NULL,
    location_uuid TEXT,
    birthdate     TEXT,               -- YYYY-MM-DD
    gender        TEXT                -- 'M' | 'F'
);

CREATE TABLE IF NOT EXISTS orders (
    uuid         TEXT PRIMARY KEY,
    patient_uuid TEXT NOT NULL,
    instructions TEXT NOT NULL,
    start_time   TEXT NOT NULL,       -- RFC 3339 UTC
    stop_time    TEXT
);

CREATE TABLE IF NOT EXISTS users (
    uuid      TEXT PRIMARY KEY,
    full_name TEXT NOT NULL
);

-- temp_cache is 1 for rows written locally after an encounter submission and
-- 0 for rows loaded from the server.
CREATE TABLE IF NOT EXISTS observations (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid             TEXT NOT NULL UNIQUE,
    patient_uuid     TEXT NOT NULL,
    encounter_uuid   TEXT NOT NULL,
    encounter_millis INTEGER NOT NULL,
    concept_uuid     TEXT NOT NULL,
    value            TEXT NOT NULL,
    temp_cache       INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sync_state (
    id                   INTEGER PRIMARY KEY CHECK (id = 0),
    full_sync_start_time TEXT,
    full_sync_end_time   TEXT,
    obs_sync_time        TEXT
);

INSERT OR IGNORE INTO sync_state (id) VALUES (0);

CREATE INDEX IF NOT EXISTS chart_items_chart_idx  ON chart_items(chart_uuid, weight);
CREATE INDEX IF NOT EXISTS patients_location_idx  ON patients(location_uuid);
CREATE INDEX IF NOT EXISTS orders_patient_idx     ON orders(patient_uuid);
CREATE INDEX IF NOT EXISTS obs_patient_idx        ON observations(patient_uuid, encounter_millis);
CREATE INDEX IF NOT EXISTS obs_key_idx
    ON observations(patient_uuid, concept_uuid, encounter_millis);

PRAGMA user_version = 1;
";

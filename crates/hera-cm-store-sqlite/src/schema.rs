//! SQL schema for the CM SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Every time column holds whole GPS seconds. Rows are never deleted; a
/// removal sets `stop_gpstime`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS parts (
    hpn                 TEXT    NOT NULL,
    hpn_rev             TEXT    NOT NULL,
    hptype              TEXT    NOT NULL,
    manufacturer_number TEXT,
    start_gpstime       INTEGER NOT NULL,
    stop_gpstime        INTEGER,          -- NULL while the part is in service
    PRIMARY KEY (hpn, hpn_rev)
);

-- A connection is identified by both ends, both ports and its start time.
CREATE TABLE IF NOT EXISTS connections (
    upstream_part         TEXT    NOT NULL,
    up_part_rev           TEXT    NOT NULL,
    upstream_output_port  TEXT    NOT NULL,
    downstream_part       TEXT    NOT NULL,
    down_part_rev         TEXT    NOT NULL,
    downstream_input_port TEXT    NOT NULL,
    start_gpstime         INTEGER NOT NULL,
    stop_gpstime          INTEGER,
    PRIMARY KEY (
        upstream_part, up_part_rev, upstream_output_port,
        downstream_part, down_part_rev, downstream_input_port,
        start_gpstime
    )
);

CREATE TABLE IF NOT EXISTS part_info (
    hpn             TEXT    NOT NULL,
    hpn_rev         TEXT    NOT NULL,
    posting_gpstime INTEGER NOT NULL,
    comment         TEXT    NOT NULL,
    reference       TEXT,
    PRIMARY KEY (hpn, hpn_rev, posting_gpstime)
);

CREATE TABLE IF NOT EXISTS apriori_antenna (
    antenna       TEXT    NOT NULL,
    status        TEXT    NOT NULL,   -- e.g. 'passed_checks', 'dish_maintenance'
    start_gpstime INTEGER NOT NULL,
    stop_gpstime  INTEGER,
    PRIMARY KEY (antenna, start_gpstime)
);

CREATE TABLE IF NOT EXISTS geo_location (
    station_name    TEXT    PRIMARY KEY,
    station_type    TEXT    NOT NULL,
    datum           TEXT    NOT NULL,
    tile            TEXT    NOT NULL,
    northing        REAL    NOT NULL,
    easting         REAL    NOT NULL,
    elevation       REAL    NOT NULL,
    created_gpstime INTEGER NOT NULL
);

-- One row per recorded modification of the store.
CREATE TABLE IF NOT EXISTS cm_version (
    update_time INTEGER PRIMARY KEY,
    git_hash    TEXT
);

CREATE INDEX IF NOT EXISTS parts_active_idx       ON parts(start_gpstime, stop_gpstime);
CREATE INDEX IF NOT EXISTS connections_active_idx ON connections(start_gpstime, stop_gpstime);
CREATE INDEX IF NOT EXISTS apriori_active_idx     ON apriori_antenna(start_gpstime, stop_gpstime);

PRAGMA user_version = 1;
";

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS runs (
            id         TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            bin_width  REAL NOT NULL,
            labels     TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS zones (
            run_id      TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            zone_id     TEXT NOT NULL,
            position    INTEGER NOT NULL,
            mmin        REAL NOT NULL,
            mmax        REAL NOT NULL,
            a           REAL NOT NULL,
            b           REAL NOT NULL,
            stdb        REAL NOT NULL DEFAULT 0,
            stdmmax     REAL NOT NULL DEFAULT 0,
            attributes  TEXT NOT NULL DEFAULT '{}',
            mag_bin     REAL NOT NULL,
            occur_rates TEXT NOT NULL DEFAULT '[]',
            weights     TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (run_id, zone_id)
        );

        CREATE TABLE IF NOT EXISTS forks (
            run_id    TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            zone_id   TEXT NOT NULL,
            fork_idx  INTEGER NOT NULL,
            label     TEXT NOT NULL,
            weight    REAL NOT NULL,
            first_mag REAL NOT NULL,
            rates     TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (run_id, zone_id, fork_idx)
        );

        CREATE TABLE IF NOT EXISTS remaining_branch_sets (
            run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            position   INTEGER NOT NULL,
            branch_set TEXT NOT NULL,
            PRIMARY KEY (run_id, position)
        );

        CREATE INDEX IF NOT EXISTS idx_zones_run ON zones(run_id);
        CREATE INDEX IF NOT EXISTS idx_forks_zone ON forks(run_id, zone_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

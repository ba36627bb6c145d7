//! Catalog schema (§6): BackupSet, Backup, Disc, Archive, File,
//! ArchiveFileMap, BackupFileMap, foreign keys enforced, `user_version`
//! pragma carrying the schema version.
//!
//! Grounded in `db.py`'s `DatabaseManager` (pragma handling, version check)
//! and in `other_examples`' `rusqlite`-based catalogs (`backup_catalog.rs`,
//! `manifest.rs`) for the relational-schema-over-`rusqlite` idiom itself --
//! none of the five teacher repos embed a relational database.

use rusqlite::Connection;

use crate::error::{ErrorKind, StrataError, StrataResult};

/// The schema version this crate writes and expects (§6: "initial value 1").
pub const SCHEMA_VERSION: i64 = 1;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS backup_set (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT
);

CREATE TABLE IF NOT EXISTS backup (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    backup_set_id   INTEGER NOT NULL REFERENCES backup_set(id),
    kind            TEXT NOT NULL CHECK (kind IN ('FULL', 'INCREMENTAL')),
    created_at      INTEGER NOT NULL,
    version_tag     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS disc (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    backup_id   INTEGER NOT NULL REFERENCES backup(id),
    seq         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS archive (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    disc_id     INTEGER NOT NULL REFERENCES disc(id),
    seq         INTEGER NOT NULL,
    name        TEXT
);

CREATE TABLE IF NOT EXISTS file (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    relative_path   TEXT NOT NULL,
    sha256          TEXT NOT NULL,
    size            INTEGER NOT NULL,
    mtime           INTEGER NOT NULL,
    UNIQUE (relative_path, sha256)
);

CREATE TABLE IF NOT EXISTS archive_file_map (
    archive_id  INTEGER NOT NULL REFERENCES archive(id),
    file_id     INTEGER NOT NULL REFERENCES file(id),
    part_index  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (archive_id, file_id)
);

CREATE TABLE IF NOT EXISTS backup_file_map (
    backup_id   INTEGER NOT NULL REFERENCES backup(id),
    file_id     INTEGER NOT NULL REFERENCES file(id),
    state       TEXT NOT NULL CHECK (state IN ('NEW', 'UPDATED', 'DELETED')),
    PRIMARY KEY (backup_id, file_id)
);

CREATE INDEX IF NOT EXISTS idx_file_relative_path ON file(relative_path);
CREATE INDEX IF NOT EXISTS idx_backup_backup_set ON backup(backup_set_id, created_at);
CREATE INDEX IF NOT EXISTS idx_disc_backup ON disc(backup_id, seq);
CREATE INDEX IF NOT EXISTS idx_archive_disc ON archive(disc_id, seq);
CREATE INDEX IF NOT EXISTS idx_afm_file ON archive_file_map(file_id);
CREATE INDEX IF NOT EXISTS idx_bfm_backup ON backup_file_map(backup_id);
"#;

/// Opens (creating if absent) the catalog at `path`, enforcing foreign keys
/// (`db.py` always opens with `pragmas={'foreign_keys': 1}`) and checking/
/// setting `user_version`. A mismatched version on an existing database is
/// `CatalogCorrupt`, a hard failure (§6).
pub fn open(path: &std::path::Path) -> StrataResult<Connection> {
    let conn = Connection::open(path).map_err(|err| {
        StrataError::with_source(ErrorKind::CatalogCorrupt, format!("failed to open catalog at {}", path.display()), err)
    })?;
    conn.pragma_update(None, "foreign_keys", true).map_err(|err| {
        StrataError::with_source(ErrorKind::CatalogCorrupt, "failed to enable foreign_keys pragma", err)
    })?;

    let user_version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|err| StrataError::with_source(ErrorKind::CatalogCorrupt, "failed to read user_version pragma", err))?;

    if user_version == 0 {
        conn.execute_batch(DDL)
            .map_err(|err| StrataError::with_source(ErrorKind::CatalogCorrupt, "failed to create catalog schema", err))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|err| StrataError::with_source(ErrorKind::CatalogCorrupt, "failed to set user_version pragma", err))?;
    } else if user_version != SCHEMA_VERSION {
        return Err(StrataError::new(
            ErrorKind::CatalogCorrupt,
            format!("catalog schema version {user_version} is not supported (expected {SCHEMA_VERSION})"),
        ));
    }

    Ok(conn)
}

/// Runs `VACUUM main` and closes the connection, mirroring `db.py`'s
/// `close_database` (§11 supplemented feature).
pub fn close(conn: Connection) -> StrataResult<()> {
    conn.execute_batch("VACUUM main;")
        .map_err(|err| StrataError::with_source(ErrorKind::CatalogCorrupt, "failed to vacuum catalog before close", err))?;
    conn.close().map_err(|(_, err)| {
        StrataError::with_source(ErrorKind::CatalogCorrupt, "failed to close catalog connection", err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_fresh_catalog_and_sets_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        let conn = open(&path).unwrap();
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn rejects_mismatched_schema_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        {
            let conn = open(&path).unwrap();
            conn.pragma_update(None, "user_version", 99_i64).unwrap();
        }
        let err = open(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CatalogCorrupt);
    }

    #[test]
    fn reopening_existing_catalog_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        {
            let conn = open(&path).unwrap();
            conn.execute(
                "INSERT INTO backup_set (name) VALUES (?1)",
                rusqlite::params!["first"],
            )
            .unwrap();
        }
        let conn = open(&path).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM backup_set", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}

//! Catalog write path (§3 ownership/lifecycle, §4.2, §4.9).
//!
//! Grounded in `db.py`'s `BackupDatabaseWriter`: one transaction per Backup,
//! dedup-by-(relative_path, sha256) on File rows, map rows created as the
//! MediumStore requests capacity. The whole run's writes live in a single
//! `rusqlite::Transaction`, committed once at the end by the caller
//! (`engine.rs`) -- "rows written inside a single transaction committed at
//! run end" (§3).

use rusqlite::{params, OptionalExtension, Transaction};

use crate::config::BackupKind;
use crate::error::{ErrorKind, StrataError, StrataResult};

/// Writes catalog rows for one backup run inside a single transaction.
pub struct CatalogWriter<'conn> {
    txn: Transaction<'conn>,
}

impl<'conn> CatalogWriter<'conn> {
    #[must_use]
    pub fn new(txn: Transaction<'conn>) -> Self {
        Self { txn }
    }

    /// Ensures a `BackupSet` row exists, creating one on first run (§3).
    pub fn ensure_backup_set(&self, name: Option<&str>) -> StrataResult<i64> {
        if let Some(id) = self
            .txn
            .query_row("SELECT id FROM backup_set LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(wrap)?
        {
            return Ok(id);
        }
        self.txn
            .execute("INSERT INTO backup_set (name) VALUES (?1)", params![name])
            .map_err(wrap)?;
        Ok(self.txn.last_insert_rowid())
    }

    /// Creates the `Backup` row for this run.
    pub fn create_backup(&self, backup_set_id: i64, kind: BackupKind, created_at: i64, version_tag: &str) -> StrataResult<i64> {
        self.txn
            .execute(
                "INSERT INTO backup (backup_set_id, kind, created_at, version_tag) VALUES (?1, ?2, ?3, ?4)",
                params![backup_set_id, kind.to_string(), created_at, version_tag],
            )
            .map_err(wrap)?;
        Ok(self.txn.last_insert_rowid())
    }

    /// Creates a `Disc` row belonging to `backup_id` (§4.9 `open_medium`).
    pub fn create_disc(&self, backup_id: i64, seq: i64) -> StrataResult<i64> {
        self.txn
            .execute("INSERT INTO disc (backup_id, seq) VALUES (?1, ?2)", params![backup_id, seq])
            .map_err(wrap)?;
        Ok(self.txn.last_insert_rowid())
    }

    /// Creates an `Archive` row belonging to `disc_id`, name unset until
    /// `set_archive_name` (§4.9 `store`).
    pub fn create_archive(&self, disc_id: i64, seq: i64) -> StrataResult<i64> {
        self.txn
            .execute("INSERT INTO archive (disc_id, seq) VALUES (?1, ?2)", params![disc_id, seq])
            .map_err(wrap)?;
        Ok(self.txn.last_insert_rowid())
    }

    /// Records the final on-medium filename for an archive (§4.9).
    pub fn set_archive_name(&self, archive_id: i64, name: &str) -> StrataResult<()> {
        self.txn
            .execute("UPDATE archive SET name = ?1 WHERE id = ?2", params![name, archive_id])
            .map_err(wrap)?;
        Ok(())
    }

    /// Creates a `File` row, or reuses one already present with the same
    /// `(relative_path, sha256)` (§3: "identical-content reoccurrences are
    /// not re-inserted").
    pub fn create_file_if_missing(&self, relative_path: &str, sha256: &str, size: u64, mtime: i64) -> StrataResult<i64> {
        if let Some(id) = self
            .txn
            .query_row(
                "SELECT id FROM file WHERE relative_path = ?1 AND sha256 = ?2",
                params![relative_path, sha256],
                |row| row.get(0),
            )
            .optional()
            .map_err(wrap)?
        {
            return Ok(id);
        }
        self.txn
            .execute(
                "INSERT INTO file (relative_path, sha256, size, mtime) VALUES (?1, ?2, ?3, ?4)",
                params![relative_path, sha256, size as i64, mtime],
            )
            .map_err(wrap)?;
        Ok(self.txn.last_insert_rowid())
    }

    /// Links a File to the Archive that stores it (§3 ArchiveFileMap).
    /// `part_index` is 0 for whole-file entries, ascending for split parts.
    pub fn map_file_to_archive(&self, archive_id: i64, file_id: i64, part_index: i64) -> StrataResult<()> {
        self.txn
            .execute(
                "INSERT INTO archive_file_map (archive_id, file_id, part_index) VALUES (?1, ?2, ?3)",
                params![archive_id, file_id, part_index],
            )
            .map_err(wrap)?;
        Ok(())
    }

    /// Records a File's state within this Backup (§3 BackupFileMap).
    pub fn map_file_to_backup(&self, backup_id: i64, file_id: i64, state: &str) -> StrataResult<()> {
        self.txn
            .execute(
                "INSERT INTO backup_file_map (backup_id, file_id, state) VALUES (?1, ?2, ?3)",
                params![backup_id, file_id, state],
            )
            .map_err(wrap)?;
        Ok(())
    }

    /// Commits every write made through this writer.
    pub fn commit(self) -> StrataResult<()> {
        self.txn.commit().map_err(wrap)
    }

    /// Rolls back every write made through this writer (§5: on failure, the
    /// driver "rolls back the catalog transaction").
    pub fn rollback(self) -> StrataResult<()> {
        self.txn.rollback().map_err(wrap)
    }
}

fn wrap(err: rusqlite::Error) -> Box<StrataError> {
    StrataError::with_source(ErrorKind::CatalogCorrupt, "catalog write failed", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema;
    use tempfile::tempdir;

    #[test]
    fn dedups_file_rows_by_path_and_hash() {
        let dir = tempdir().unwrap();
        let mut conn = schema::open(&dir.path().join("c.sqlite")).unwrap();
        let txn = conn.transaction().unwrap();
        let writer = CatalogWriter::new(txn);

        let set_id = writer.ensure_backup_set(None).unwrap();
        let backup_id = writer.create_backup(set_id, BackupKind::Full, 0, "1").unwrap();

        let id1 = writer.create_file_if_missing("/a.txt", "deadbeef", 4, 0).unwrap();
        let id2 = writer.create_file_if_missing("/a.txt", "deadbeef", 4, 0).unwrap();
        assert_eq!(id1, id2);

        writer.map_file_to_backup(backup_id, id1, "NEW").unwrap();
        writer.commit().unwrap();
    }

    #[test]
    fn distinct_hash_creates_new_file_row() {
        let dir = tempdir().unwrap();
        let mut conn = schema::open(&dir.path().join("c.sqlite")).unwrap();
        let txn = conn.transaction().unwrap();
        let writer = CatalogWriter::new(txn);

        let id1 = writer.create_file_if_missing("/a.txt", "hash1", 4, 0).unwrap();
        let id2 = writer.create_file_if_missing("/a.txt", "hash2", 4, 0).unwrap();
        assert_ne!(id1, id2);
        writer.commit().unwrap();
    }
}

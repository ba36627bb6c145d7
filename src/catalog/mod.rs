//! C8: Catalog.
//!
//! Ties `schema`/`writer`/`reader` together behind one handle, mirroring
//! the teacher's `repository.rs` role of owning the on-disk state a run
//! reads and writes against. Grounded in `db.py`'s `DatabaseManager` acting
//! as the single owner of the sqlite connection for a run's lifetime.

pub mod reader;
pub mod schema;
pub mod writer;

use std::path::Path;

use rusqlite::Connection;

pub use reader::{ArchiveLocation, FileInfo};
pub use writer::CatalogWriter;

use crate::error::StrataResult;
use crate::filter::EffectiveView;

/// Owns the catalog's sqlite connection for the duration of a run.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Opens (or creates) the catalog at `path` (§6).
    pub fn open(path: &Path) -> StrataResult<Self> {
        Ok(Self { conn: schema::open(path)? })
    }

    /// Runs `VACUUM` and closes the connection (§11 supplemented feature).
    pub fn close(self) -> StrataResult<()> {
        schema::close(self.conn)
    }

    /// Starts a transactional writer for one backup run (§4.9).
    pub fn begin_writer(&mut self) -> StrataResult<CatalogWriter<'_>> {
        let txn = self.conn.transaction().map_err(|err| {
            crate::error::StrataError::with_source(crate::error::ErrorKind::CatalogCorrupt, "failed to begin catalog transaction", err)
        })?;
        Ok(CatalogWriter::new(txn))
    }

    /// The `BackupSet` row's id, if one has already been created by a prior
    /// run (§3). `engine.rs` uses this, ahead of opening a writer, to decide
    /// whether an empty catalog forces `BackupKind::Full`.
    pub fn find_backup_set(&self) -> StrataResult<Option<i64>> {
        use rusqlite::OptionalExtension;
        self.conn
            .query_row("SELECT id FROM backup_set LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(|err| crate::error::StrataError::with_source(crate::error::ErrorKind::CatalogCorrupt, "failed to read backup_set", err))
    }

    /// The coarse `relative_path -> sha256` view the Filter consumes (§4.2,
    /// §4.8). Empty for a BackupSet with no prior Backups.
    pub fn effective_view(&self, backup_set_id: i64) -> StrataResult<EffectiveView> {
        reader::effective_view(&self.conn, backup_set_id)
    }

    /// The detailed effective view, carrying each file's catalog identity
    /// and owning Backup, for restore planning (§4.8, §4.10).
    pub fn effective_view_detailed(&self, backup_set_id: i64) -> StrataResult<std::collections::HashMap<String, FileInfo>> {
        reader::effective_view_detailed(&self.conn, backup_set_id)
    }

    /// Resolves every Archive holding a part of `file_id` under `backup_id`,
    /// in ascending reassembly order (§4.4, §4.10).
    pub fn locate_file(&self, backup_id: i64, file_id: i64) -> StrataResult<Vec<ArchiveLocation>> {
        reader::locate_file(&self.conn, backup_id, file_id)
    }

    /// Direct access to the underlying connection, for callers (e.g.
    /// `medium.rs`) that need to read `archive.name`/`disc.seq` directly.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupKind;
    use tempfile::tempdir;

    #[test]
    fn open_write_commit_then_read_back_round_trips() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("c.sqlite")).unwrap();

        let (set_id, backup_id) = {
            let writer = catalog.begin_writer().unwrap();
            let set_id = writer.ensure_backup_set(None).unwrap();
            let backup_id = writer.create_backup(set_id, BackupKind::Full, 0, "1").unwrap();
            let file_id = writer
                .create_file_if_missing("/a.txt", &crate::digest::hash(b"hi").to_hex(), 2, 0)
                .unwrap();
            writer.map_file_to_backup(backup_id, file_id, "NEW").unwrap();
            writer.commit().unwrap();
            (set_id, backup_id)
        };

        let view = catalog.effective_view(set_id).unwrap();
        assert!(view.contains_key("/a.txt"));
        assert!(backup_id > 0);

        catalog.close().unwrap();
    }
}

//! Catalog read path: the §4.8 effective-view algorithm and archive
//! location lookups for restore planning.
//!
//! Grounded in `db.py`'s `BackupDatabaseReader`/`create_reader_from_backup`:
//! walk Backups newest-first until (and including) the most recent FULL,
//! then fold forward in chronological order so later BackupFileMap rows
//! overwrite or delete earlier ones.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::digest::Digest;
use crate::error::{ErrorKind, StrataError, StrataResult};
use crate::filter::EffectiveView;

/// One file as known by the effective view at some point in the Backup
/// chain: its catalog identity plus the Backup it was last written under
/// (needed to resolve which physical Archive holds its bytes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub file_id: i64,
    pub relative_path: String,
    pub sha256: Digest,
    pub size: u64,
    pub mtime: i64,
    /// The Backup whose run wrote this file's current archive entry.
    pub backup_id: i64,
}

/// Where one archived part of a file lives on a medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveLocation {
    pub archive_id: i64,
    pub disc_id: i64,
    pub part_index: i64,
}

/// Builds the effective view of `backup_set_id`: every Backup back to and
/// including the most recent FULL, folded chronologically (§4.8).
///
/// Returns an empty map if the BackupSet has no Backups yet, which callers
/// use to force the next run to `BackupKind::Full` (§3).
pub fn effective_view_detailed(conn: &Connection, backup_set_id: i64) -> StrataResult<HashMap<String, FileInfo>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind FROM backup WHERE backup_set_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .map_err(wrap)?;
    let rows = stmt
        .query_map(params![backup_set_id], |row| {
            let id: i64 = row.get(0)?;
            let kind: String = row.get(1)?;
            Ok((id, kind))
        })
        .map_err(wrap)?;

    let mut newest_first = Vec::new();
    for row in rows {
        let (id, kind) = row.map_err(wrap)?;
        let is_full = kind == "FULL";
        newest_first.push(id);
        if is_full {
            break;
        }
    }
    let chain: Vec<i64> = newest_first.into_iter().rev().collect();

    let mut view: HashMap<String, FileInfo> = HashMap::new();
    for backup_id in chain {
        let mut stmt = conn
            .prepare(
                "SELECT f.id, f.relative_path, f.sha256, f.size, f.mtime, m.state
                 FROM backup_file_map m JOIN file f ON f.id = m.file_id
                 WHERE m.backup_id = ?1",
            )
            .map_err(wrap)?;
        let rows = stmt
            .query_map(params![backup_id], |row| {
                let id: i64 = row.get(0)?;
                let relative_path: String = row.get(1)?;
                let sha256: String = row.get(2)?;
                let size: i64 = row.get(3)?;
                let mtime: i64 = row.get(4)?;
                let state: String = row.get(5)?;
                Ok((id, relative_path, sha256, size, mtime, state))
            })
            .map_err(wrap)?;

        for row in rows {
            let (file_id, relative_path, sha256_hex, size, mtime, state) = row.map_err(wrap)?;
            match state.as_str() {
                "DELETED" => {
                    view.remove(&relative_path);
                }
                "NEW" | "UPDATED" => {
                    let sha256 = decode_hex(&sha256_hex)?;
                    view.insert(
                        relative_path.clone(),
                        FileInfo {
                            file_id,
                            relative_path,
                            sha256,
                            size: size as u64,
                            mtime,
                            backup_id,
                        },
                    );
                }
                other => {
                    return Err(StrataError::new(
                        ErrorKind::CatalogCorrupt,
                        format!("unrecognized backup_file_map state {other:?}"),
                    ))
                }
            }
        }
    }

    Ok(view)
}

/// The coarse `relative_path -> sha256` projection the Filter consumes
/// (§4.2), derived from [`effective_view_detailed`].
pub fn effective_view(conn: &Connection, backup_set_id: i64) -> StrataResult<EffectiveView> {
    Ok(effective_view_detailed(conn, backup_set_id)?
        .into_iter()
        .map(|(path, info)| (path, info.sha256))
        .collect())
}

/// Resolves every Archive that holds a part of `file_id`, restricted to
/// `backup_id`'s own Discs, ordered ascending by part index then Archive id
/// so concatenation reproduces the original bytes (§4.4, §4.10).
pub fn locate_file(conn: &Connection, backup_id: i64, file_id: i64) -> StrataResult<Vec<ArchiveLocation>> {
    let mut stmt = conn
        .prepare(
            "SELECT a.id, a.disc_id, m.part_index
             FROM archive_file_map m
             JOIN archive a ON a.id = m.archive_id
             JOIN disc d ON d.id = a.disc_id
             WHERE d.backup_id = ?1 AND m.file_id = ?2
             ORDER BY m.part_index ASC, a.id ASC",
        )
        .map_err(wrap)?;
    let rows = stmt
        .query_map(params![backup_id, file_id], |row| {
            Ok(ArchiveLocation {
                archive_id: row.get(0)?,
                disc_id: row.get(1)?,
                part_index: row.get(2)?,
            })
        })
        .map_err(wrap)?;

    let mut locations = Vec::new();
    for row in rows {
        locations.push(row.map_err(wrap)?);
    }
    if locations.is_empty() {
        return Err(StrataError::new(
            ErrorKind::CatalogCorrupt,
            format!("file {file_id} has no recorded archive location under backup {backup_id}"),
        ));
    }
    Ok(locations)
}

fn decode_hex(hex_str: &str) -> StrataResult<Digest> {
    let bytes = hex::decode(hex_str)
        .map_err(|err| StrataError::with_source(ErrorKind::CatalogCorrupt, "malformed sha256 column", err))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StrataError::new(ErrorKind::CatalogCorrupt, "sha256 column is not 32 bytes"))?;
    Ok(Digest::new(array))
}

fn wrap(err: rusqlite::Error) -> Box<StrataError> {
    StrataError::with_source(ErrorKind::CatalogCorrupt, "catalog read failed", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema;
    use crate::catalog::writer::CatalogWriter;
    use crate::config::BackupKind;
    use crate::digest::hash;
    use tempfile::tempdir;

    #[test]
    fn effective_view_starts_from_most_recent_full() {
        let dir = tempdir().unwrap();
        let mut conn = schema::open(&dir.path().join("c.sqlite")).unwrap();

        let set_id;
        let full_backup_id;
        {
            let txn = conn.transaction().unwrap();
            let writer = CatalogWriter::new(txn);
            set_id = writer.ensure_backup_set(None).unwrap();
            full_backup_id = writer.create_backup(set_id, BackupKind::Full, 0, "1").unwrap();
            let file_id = writer.create_file_if_missing("/a.txt", &hash(b"v1").to_hex(), 2, 0).unwrap();
            writer.map_file_to_backup(full_backup_id, file_id, "NEW").unwrap();
            writer.commit().unwrap();
        }
        {
            let txn = conn.transaction().unwrap();
            let writer = CatalogWriter::new(txn);
            let inc_id = writer.create_backup(set_id, BackupKind::Incremental, 1, "2").unwrap();
            let file_id = writer.create_file_if_missing("/a.txt", &hash(b"v2").to_hex(), 2, 1).unwrap();
            writer.map_file_to_backup(inc_id, file_id, "UPDATED").unwrap();
            writer.commit().unwrap();
        }

        let view = effective_view(&conn, set_id).unwrap();
        assert_eq!(view.get("/a.txt"), Some(&hash(b"v2")));
    }

    #[test]
    fn deleted_state_removes_from_view() {
        let dir = tempdir().unwrap();
        let mut conn = schema::open(&dir.path().join("c.sqlite")).unwrap();

        let set_id;
        {
            let txn = conn.transaction().unwrap();
            let writer = CatalogWriter::new(txn);
            set_id = writer.ensure_backup_set(None).unwrap();
            let backup_id = writer.create_backup(set_id, BackupKind::Full, 0, "1").unwrap();
            let file_id = writer.create_file_if_missing("/gone.txt", &hash(b"v1").to_hex(), 2, 0).unwrap();
            writer.map_file_to_backup(backup_id, file_id, "NEW").unwrap();
            writer.commit().unwrap();
        }
        {
            let txn = conn.transaction().unwrap();
            let writer = CatalogWriter::new(txn);
            let backup_id = writer.create_backup(set_id, BackupKind::Incremental, 1, "2").unwrap();
            let file_id = writer.create_file_if_missing("/gone.txt", &hash(b"v1").to_hex(), 2, 0).unwrap();
            writer.map_file_to_backup(backup_id, file_id, "DELETED").unwrap();
            writer.commit().unwrap();
        }

        let view = effective_view(&conn, set_id).unwrap();
        assert!(!view.contains_key("/gone.txt"));
    }

    #[test]
    fn locate_file_orders_parts_ascending() {
        let dir = tempdir().unwrap();
        let mut conn = schema::open(&dir.path().join("c.sqlite")).unwrap();

        let txn = conn.transaction().unwrap();
        let writer = CatalogWriter::new(txn);
        let set_id = writer.ensure_backup_set(None).unwrap();
        let backup_id = writer.create_backup(set_id, BackupKind::Full, 0, "1").unwrap();
        let disc_id = writer.create_disc(backup_id, 0).unwrap();
        let archive_2 = writer.create_archive(disc_id, 1).unwrap();
        let archive_1 = writer.create_archive(disc_id, 0).unwrap();
        let file_id = writer.create_file_if_missing("/huge.bin", &hash(b"x").to_hex(), 10, 0).unwrap();
        writer.map_file_to_archive(archive_2, file_id, 1).unwrap();
        writer.map_file_to_archive(archive_1, file_id, 0).unwrap();
        writer.commit().unwrap();

        let locations = locate_file(&conn, backup_id, file_id).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].archive_id, archive_1);
        assert_eq!(locations[1].archive_id, archive_2);
    }
}

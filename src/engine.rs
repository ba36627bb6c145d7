//! Top-level drivers.
//!
//! Grounded in the teacher's `Repository`/`commands::backup::backup` pair:
//! one free function per direction, each owning the Catalog connection for
//! its run and wiring every component (C1-C10) together. `rustic_core`
//! exposes a `Repository` handle plus free `backup`/`restore` functions
//! rather than one god object; we follow that shape here with
//! `run_backup`/`run_restore`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::info;

use crate::bulk::{Bulker, Group};
use crate::catalog::Catalog;
use crate::config::{BackupKind, EngineOptions, RestoreOptions};
use crate::crypto::{self, Encryptor};
use crate::error::{ErrorKind, StrataError, StrataResult};
use crate::filter::{EffectiveView, Filter};
use crate::hook::OperatorHook;
use crate::medium::MediumStore;
use crate::pipeline::{self, ArchivePackage, WorkItem};
use crate::progress::{self, ProgressType};
use crate::restore;
use crate::walker::{FileEntry, Walker};

/// Counts from one completed backup run (§8, for driver-side assertions and
/// operator visibility).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub files_new: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub bytes_archived: u64,
    pub discs_used: u64,
    pub skipped_entries: u64,
}

/// Runs one backup (§4.1-§4.9): walk, filter, bulk, compress/encrypt, stage
/// to medium, write the catalog transactionally, commit.
pub fn run_backup(options: &EngineOptions) -> StrataResult<BackupSummary> {
    let mut catalog = Catalog::open(&options.catalog_path)?;
    let existing_set_id = catalog.find_backup_set()?;

    let prior_view = match existing_set_id {
        Some(set_id) => catalog.effective_view_detailed(set_id)?,
        None => HashMap::new(),
    };
    // An empty prior view -- no BackupSet yet, or one with no NEW/UPDATED
    // rows -- forces this run to FULL regardless of what was requested (§3).
    let kind = if prior_view.is_empty() { BackupKind::Full } else { options.kind };

    // A FULL backup is the chain's anchor: it must be restorable without any
    // earlier Backup, so it re-emits every current file rather than only
    // those changed since the last comparison (§3 "earliest Backup in any
    // effective chain is FULL", §4.8). An INCREMENTAL run compares against
    // the real effective view.
    let coarse_view: EffectiveView = match kind {
        BackupKind::Full => EffectiveView::new(),
        BackupKind::Incremental => prior_view.iter().map(|(path, info)| (path.clone(), info.sha256)).collect(),
    };

    let hook = OperatorHook::new(options.hook_command.clone());
    let encryptor = crypto::build(options.archive.cipher, options.archive.passphrase.as_deref());
    let progress_bars = progress::build(options.progress);

    let walk_progress = progress_bars.progress(ProgressType::Counter, "walking source");
    let mut walker = Walker::new(options.source.clone(), false);
    let entries = walker.walk()?;
    let skipped_entries = walker.skipped_count();
    walk_progress.set_length(entries.len() as u64);
    walk_progress.inc(entries.len() as u64);
    walk_progress.finish();

    let mut filter = Filter::new();
    let mut changed = Vec::new();
    for entry in entries {
        let absolute_path = entry.absolute_path.clone();
        if let Some(entry) = filter.apply(&coarse_view, entry, || {
            let file = fs::File::open(&absolute_path)?;
            crate::digest::hash_reader(file).map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
        })? {
            changed.push(entry);
        }
    }

    let file_index: HashMap<String, FileEntry> = filter.handled().clone();

    let mut bulker = Bulker::new(options.archive.budget_bytes);
    let mut items = Vec::new();
    for entry in changed {
        for group in bulker.push(entry) {
            items.push(group_to_work_item(group, options.archive.budget_bytes));
        }
    }
    if let Some(group) = bulker.finish() {
        items.push(group_to_work_item(group, options.archive.budget_bytes));
    }

    let writer = catalog.begin_writer()?;
    let set_id = writer.ensure_backup_set(None)?;
    let created_at = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let backup_id = writer.create_backup(set_id, kind, created_at, env!("CARGO_PKG_VERSION"))?;

    let mut medium_store = MediumStore::new(options.destination.clone(), options.medium.clone(), hook.clone());
    let mut current_disc_id: Option<i64> = None;
    let mut disc_seq: i64 = 0;
    let mut archive_seq: i64 = 0;
    let mut mapped_to_backup: HashSet<i64> = HashSet::new();
    let mut summary = BackupSummary {
        skipped_entries,
        ..BackupSummary::default()
    };

    let archive_opts = &options.archive;
    let sync_encryptor: Option<&(dyn Encryptor + Sync)> = encryptor.as_deref().map(|e| e as &(dyn Encryptor + Sync));
    let archive_progress = progress_bars.progress(ProgressType::Bytes, "archiving");
    let result = pipeline::run(items, archive_opts, &options.concurrency, sync_encryptor, |package: ArchivePackage| {
        if medium_store.need_new_medium() {
            if let Some(prev_disc_id) = current_disc_id {
                medium_store.finalize_medium(prev_disc_id)?;
            }
            let disc_id = writer.create_disc(backup_id, disc_seq)?;
            disc_seq += 1;
            archive_seq = 0;
            medium_store.open_medium(disc_id)?;
            current_disc_id = Some(disc_id);
            summary.discs_used += 1;
        }
        let disc_id = current_disc_id.expect("a medium is always open before store");

        let archive_id = writer.create_archive(disc_id, archive_seq)?;
        archive_seq += 1;

        let name = medium_store.store(&package, archive_id, archive_opts.codec, archive_opts.cipher)?;
        writer.set_archive_name(archive_id, &name)?;
        summary.bytes_archived += package.size;
        archive_progress.inc(package.size);

        let part_index = package.part.as_ref().map_or(0, |(index, _)| i64::from(*index));

        for relative_path in &package.relative_paths {
            let entry = file_index
                .get(relative_path)
                .expect("every archived path was observed by the walker this run");
            let sha_hex = entry
                .sha256
                .expect("the filter hashes every entry it emits")
                .to_hex();
            let mtime = entry
                .mtime
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            let file_id = writer.create_file_if_missing(relative_path, &sha_hex, entry.size, mtime)?;
            writer.map_file_to_archive(archive_id, file_id, part_index)?;

            if mapped_to_backup.insert(file_id) {
                let state = if prior_view.contains_key(relative_path) { "UPDATED" } else { "NEW" };
                writer.map_file_to_backup(backup_id, file_id, state)?;
                if state == "NEW" {
                    summary.files_new += 1;
                } else {
                    summary.files_updated += 1;
                }
            }
        }

        Ok(())
    });

    if let Err(err) = result {
        writer.rollback()?;
        catalog.close()?;
        return Err(err);
    }
    archive_progress.finish();

    for path in filter.deletions(&coarse_view) {
        let Some(info) = prior_view.get(path) else { continue };
        writer.map_file_to_backup(backup_id, info.file_id, "DELETED")?;
        summary.files_deleted += 1;
    }

    if let Some(disc_id) = current_disc_id {
        medium_store.finalize_medium(disc_id)?;
    }

    writer.commit()?;
    medium_store.finalize_backup(&options.catalog_path, encryptor.as_deref())?;
    hook.fire("finish_backup", &options.destination.display().to_string());
    catalog.close()?;

    info!(
        "backup complete: {} new, {} updated, {} deleted, {} disc(s)",
        summary.files_new, summary.files_updated, summary.files_deleted, summary.discs_used
    );
    Ok(summary)
}

/// Maps one flushed [`Group`] to the work item the Pipeline expects: a
/// singleton whose lone entry exceeds the budget is the Bulker's oversize
/// escape hatch (§4.3) and must be split, not archived whole.
fn group_to_work_item(group: Group, budget: u64) -> WorkItem {
    if group.len() == 1 && group[0].size > budget {
        let mut group = group;
        WorkItem::Oversize(group.remove(0))
    } else {
        WorkItem::Group(group)
    }
}

/// Runs a restore (§4.10): locate a catalog copy under `source`, decrypt it
/// if needed, and hand off to [`crate::restore::restore`].
pub fn run_restore(options: &RestoreOptions) -> StrataResult<()> {
    let hook = OperatorHook::new(options.hook_command.clone());
    let encryptor = crypto::build(options.cipher, options.passphrase.as_deref());

    let catalog_filename = match &encryptor {
        Some(encryptor) => format!("{}.{}", options.medium.catalog_filename, encryptor.extension()),
        None => options.medium.catalog_filename.clone(),
    };
    let found = find_catalog_copy(&options.source, &catalog_filename)?;

    let (catalog_path, _temp) = match &encryptor {
        None => (found, None),
        Some(encryptor) => {
            let temp = tempfile::NamedTempFile::new()?;
            encryptor.decrypt(&found, temp.path())?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };

    let mut catalog = Catalog::open(&catalog_path)?;
    let set_id = catalog.find_backup_set()?.ok_or_else(|| {
        StrataError::new(ErrorKind::CatalogCorrupt, "restored catalog has no backup set")
    })?;

    restore::restore(&catalog, set_id, &options.source, &options.destination, &options.filter, encryptor.as_deref())?;

    catalog.close()?;
    hook.fire("finish_restore", &options.destination.display().to_string());
    Ok(())
}

/// Walks `source` for the first file named `filename` (the MediumStore
/// copies it, identically, into every medium directory used, so the first
/// hit is as good as any -- §4.9, §9 "prefer the destination copy, then any
/// medium's copy").
fn find_catalog_copy(source: &Path, filename: &str) -> StrataResult<PathBuf> {
    for entry in walkdir::WalkDir::new(source).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() && entry.file_name() == filename {
            return Ok(entry.path().to_path_buf());
        }
    }
    Err(StrataError::new(
        ErrorKind::SourceIo,
        format!("no catalog copy named {filename:?} found under {}", source.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConcurrencyOptions;
    use tempfile::tempdir;

    fn single_threaded(options: EngineOptions) -> EngineOptions {
        options.concurrency(ConcurrencyOptions {
            enabled: false,
            ..ConcurrencyOptions::default()
        })
    }

    #[test]
    fn empty_source_produces_full_backup_with_no_discs() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let options = single_threaded(
            EngineOptions::default()
                .source(source.path())
                .destination(dest.path())
                .catalog_path(dest.path().join("catalog.sqlite")),
        );

        let summary = run_backup(&options).unwrap();
        assert_eq!(summary, BackupSummary::default());
    }

    #[test]
    fn round_trip_backs_up_and_restores_nested_files() {
        let source = tempdir().unwrap();
        fs::write(source.path().join("a.txt"), b"hello world").unwrap();
        fs::create_dir(source.path().join("sub")).unwrap();
        fs::write(source.path().join("sub/b.txt"), b"nested file").unwrap();

        let dest = tempdir().unwrap();
        let options = single_threaded(
            EngineOptions::default()
                .source(source.path())
                .destination(dest.path())
                .catalog_path(dest.path().join("catalog.sqlite")),
        );

        let summary = run_backup(&options).unwrap();
        assert_eq!(summary.files_new, 2);
        assert_eq!(summary.files_deleted, 0);
        assert!(summary.discs_used >= 1);

        let restore_dest = tempdir().unwrap();
        let restore_options = RestoreOptions::default().source(dest.path()).destination(restore_dest.path());
        run_restore(&restore_options).unwrap();

        assert_eq!(fs::read(restore_dest.path().join("a.txt")).unwrap(), b"hello world");
        assert_eq!(fs::read(restore_dest.path().join("sub/b.txt")).unwrap(), b"nested file");
    }

    #[test]
    fn incremental_run_labels_new_updated_and_deleted_correctly() {
        let source = tempdir().unwrap();
        fs::write(source.path().join("a.txt"), b"version one").unwrap();
        fs::write(source.path().join("b.txt"), b"stays the same").unwrap();

        let dest = tempdir().unwrap();
        let base_options = single_threaded(
            EngineOptions::default()
                .source(source.path())
                .destination(dest.path())
                .catalog_path(dest.path().join("catalog.sqlite")),
        );

        let first = run_backup(&base_options).unwrap();
        assert_eq!(first.files_new, 2);
        assert_eq!(first.files_updated, 0);

        fs::write(source.path().join("a.txt"), b"version two").unwrap();
        fs::write(source.path().join("c.txt"), b"brand new").unwrap();
        fs::remove_file(source.path().join("b.txt")).unwrap();

        let second_options = base_options.clone().kind(BackupKind::Incremental);
        let second = run_backup(&second_options).unwrap();

        assert_eq!(second.files_new, 1, "only c.txt is new");
        assert_eq!(second.files_updated, 1, "only a.txt changed content");
        assert_eq!(second.files_deleted, 1, "b.txt was removed from source");
    }
}

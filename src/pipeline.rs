//! C7: Pipeline.
//!
//! Connects Bulker output to Compressor/Encryptor under backpressure (§4.7,
//! §5). Grounded in `multi/archive.py`'s `ThreadingArchiveManager`: a
//! bounded in-flight list of futures, drained FIFO once it reaches the
//! backpressure budget, with a full-drain barrier before a split file's
//! parts are emitted so they land on the medium contiguously and in order.

use std::collections::VecDeque;
use std::path::PathBuf;

use crossbeam_channel::{bounded, Receiver};
use log::{debug, trace};
use tempfile::NamedTempFile;

use crate::archive;
use crate::bulk::Group;
use crate::config::{ArchiveOptions, ConcurrencyOptions};
use crate::crypto::Encryptor;
use crate::error::{ErrorKind, StrataError, StrataResult};
use crate::split::split_file;
use crate::walker::FileEntry;

/// One unit of work flowing from the Bulker into the Pipeline: either a
/// normal [`Group`] or a single oversize [`FileEntry`] still to be split.
pub enum WorkItem {
    Group(Group),
    Oversize(FileEntry),
}

/// A single produced archive file, staged and ready for [`crate::medium`]
/// (§4.7). `part` is `Some((index, relative_path))` for a split fragment.
pub struct ArchivePackage {
    pub staged_path: PathBuf,
    pub relative_paths: Vec<String>,
    pub part: Option<(u32, String)>,
    pub size: u64,
    _temp: Option<NamedTempFile>,
}

#[cfg(test)]
impl ArchivePackage {
    /// Builds a bare package around an already-staged file, for tests in
    /// sibling modules (e.g. `medium.rs`) that exercise `MediumStore`
    /// without running the full compress/encrypt pipeline.
    pub(crate) fn for_test(staged_path: PathBuf, size: u64) -> Self {
        Self {
            staged_path,
            relative_paths: Vec::new(),
            part: None,
            size,
            _temp: None,
        }
    }
}

/// Compresses (and optionally encrypts) one [`Group`], producing a single
/// staged [`ArchivePackage`].
fn process_group(
    group: &Group,
    archive_opts: &ArchiveOptions,
    encryptor: Option<&(dyn Encryptor + Sync)>,
) -> StrataResult<ArchivePackage> {
    let entries: Vec<archive::ArchiveEntry> = group
        .iter()
        .map(|f| archive::ArchiveEntry {
            entry_name: f.relative_path.clone(),
            src_path: f.absolute_path.clone(),
            size: f.size,
        })
        .collect();

    let archive_temp = NamedTempFile::new()?;
    archive::archive(&entries, archive_temp.path(), archive_opts.codec)?;

    let staged = stage_encryption(archive_temp, encryptor)?;
    let size = std::fs::metadata(&staged.0)?.len();

    Ok(ArchivePackage {
        staged_path: staged.0,
        relative_paths: group.iter().map(|f| f.relative_path.clone()).collect(),
        part: None,
        size,
        _temp: staged.1,
    })
}

/// Splits an oversize file and compresses each part into its own
/// [`ArchivePackage`], in ascending part order (§4.4, §4.7).
fn process_oversize(
    entry: &FileEntry,
    archive_opts: &ArchiveOptions,
    encryptor: Option<&(dyn Encryptor + Sync)>,
) -> StrataResult<Vec<ArchivePackage>> {
    let parts = split_file(&entry.absolute_path, archive_opts.budget_bytes)?;

    let mut packages = Vec::with_capacity(parts.len());
    for part in parts {
        let archive_temp = NamedTempFile::new()?;
        archive::archive_single(&part.path, &entry.relative_path, archive_temp.path(), archive_opts.codec)?;
        let staged = stage_encryption(archive_temp, encryptor)?;
        let size = std::fs::metadata(&staged.0)?.len();
        packages.push(ArchivePackage {
            staged_path: staged.0,
            relative_paths: vec![entry.relative_path.clone()],
            part: Some((part.index, entry.relative_path.clone())),
            size,
            _temp: staged.1,
        });
    }
    Ok(packages)
}

/// Encrypts the compressed archive in place if a cipher is configured,
/// returning the final staged path plus the temp handle that owns it.
fn stage_encryption(
    archive_temp: NamedTempFile,
    encryptor: Option<&(dyn Encryptor + Sync)>,
) -> StrataResult<(PathBuf, Option<NamedTempFile>)> {
    match encryptor {
        None => {
            let path = archive_temp.path().to_path_buf();
            Ok((path, Some(archive_temp)))
        }
        Some(encryptor) => {
            let cipher_temp = NamedTempFile::new()?;
            encryptor.encrypt(archive_temp.path(), cipher_temp.path())?;
            let path = cipher_temp.path().to_path_buf();
            Ok((path, Some(cipher_temp)))
        }
    }
}

/// Drives `items` through compression/encryption, calling `on_package` for
/// every produced [`ArchivePackage`] in Bulker output order.
///
/// `concurrency.enabled == false` selects the single-threaded mode (§4.7):
/// strict lazy pull, one archive in flight at a time. Otherwise, Groups are
/// dispatched to the `rayon` global pool up to `backpressure_budget` in
/// flight, drained FIFO; an `Oversize` item first drains every in-flight
/// Group (the "synchronization barrier", §4.7/§5) before its parts are
/// produced, also one at a time, preserving contiguous part ordering.
pub fn run(
    items: impl IntoIterator<Item = WorkItem>,
    archive_opts: &ArchiveOptions,
    concurrency: &ConcurrencyOptions,
    encryptor: Option<&(dyn Encryptor + Sync)>,
    mut on_package: impl FnMut(ArchivePackage) -> StrataResult<()>,
) -> StrataResult<()> {
    if !concurrency.enabled {
        for item in items {
            match item {
                WorkItem::Group(group) => on_package(process_group(&group, archive_opts, encryptor)?)?,
                WorkItem::Oversize(entry) => {
                    for package in process_oversize(&entry, archive_opts, encryptor)? {
                        on_package(package)?;
                    }
                }
            }
        }
        return Ok(());
    }

    let budget = concurrency.backpressure_budget.max(1);

    // `rayon::Scope` lets spawned closures borrow `archive_opts`/`encryptor`
    // without requiring `'static` (unlike `rayon::spawn`), mirroring the
    // teacher's `pariter::scope` use in `archiver.rs` for the same reason.
    let body = move |scope: &rayon::Scope| -> StrataResult<()> {
        let mut in_flight: VecDeque<Receiver<StrataResult<ArchivePackage>>> = VecDeque::new();

        let drain_one = |in_flight: &mut VecDeque<Receiver<StrataResult<ArchivePackage>>>,
                         on_package: &mut dyn FnMut(ArchivePackage) -> StrataResult<()>|
         -> StrataResult<()> {
            if let Some(receiver) = in_flight.pop_front() {
                let package = receiver.recv().expect("worker dropped result channel")?;
                on_package(package)?;
            }
            Ok(())
        };

        for item in items {
            match item {
                WorkItem::Group(group) => {
                    if in_flight.len() >= budget {
                        drain_one(&mut in_flight, &mut on_package)?;
                    }
                    let (sender, receiver) = bounded(1);
                    scope.spawn(move |_| {
                        let result = process_group(&group, archive_opts, encryptor);
                        let _ = sender.send(result);
                    });
                    in_flight.push_back(receiver);
                    trace!("dispatched group, {} in flight", in_flight.len());
                }
                WorkItem::Oversize(entry) => {
                    debug!("draining in-flight archives before split barrier");
                    while !in_flight.is_empty() {
                        drain_one(&mut in_flight, &mut on_package)?;
                    }
                    for package in process_oversize(&entry, archive_opts, encryptor)? {
                        on_package(package)?;
                    }
                }
            }
        }

        while !in_flight.is_empty() {
            drain_one(&mut in_flight, &mut on_package)?;
        }

        Ok(())
    };

    // `workers` is a per-run override (§5 "or user override"); when set, the
    // run gets its own sized pool instead of sharing rayon's ambient global
    // one.
    match concurrency.workers {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build().map_err(|err| {
                StrataError::with_source(ErrorKind::ConcurrencyInit, "failed to build worker pool", err)
            })?;
            pool.scope(body)
        }
        None => rayon::scope(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn write_source(dir: &std::path::Path, name: &str, bytes: &[u8]) -> FileEntry {
        let path = dir.join(name.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        FileEntry {
            absolute_path: path.clone(),
            relative_path: format!("/{name}"),
            size: bytes.len() as u64,
            mtime: SystemTime::now(),
            sha256: None,
        }
    }

    #[test]
    fn single_threaded_mode_preserves_order() {
        let dir = tempdir().unwrap();
        let a = write_source(dir.path(), "a.txt", b"aaa");
        let b = write_source(dir.path(), "b.txt", b"bbb");

        let archive_opts = ArchiveOptions::default();
        let concurrency = ConcurrencyOptions {
            enabled: false,
            ..ConcurrencyOptions::default()
        };

        let mut seen = Vec::new();
        run(
            vec![WorkItem::Group(vec![a]), WorkItem::Group(vec![b])],
            &archive_opts,
            &concurrency,
            None,
            |package| {
                seen.push(package.relative_paths[0].clone());
                Ok(())
            },
        )
        .unwrap();

        assert!(seen[0].ends_with("a.txt"));
        assert!(seen[1].ends_with("b.txt"));
    }

    #[test]
    fn parallel_mode_preserves_order_across_many_groups() {
        let dir = tempdir().unwrap();
        let mut items = Vec::new();
        let mut expected = Vec::new();
        for i in 0..12 {
            let name = format!("f{i}.txt");
            let entry = write_source(dir.path(), &name, format!("payload-{i}").as_bytes());
            expected.push(entry.relative_path.clone());
            items.push(WorkItem::Group(vec![entry]));
        }

        let archive_opts = ArchiveOptions::default();
        let concurrency = ConcurrencyOptions {
            enabled: true,
            workers: Some(4),
            backpressure_budget: 3,
        };

        let mut seen = Vec::new();
        run(items, &archive_opts, &concurrency, None, |package| {
            seen.push(package.relative_paths[0].clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, expected);
    }
}

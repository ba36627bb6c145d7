//! C1: Walker.
//!
//! Grounded in `luke.py`'s `LukeFilewalker.walk_directory` (relative path,
//! size, mtime, sha256) and in the teacher's `backend::ignore::LocalSource`,
//! which builds its recursive walk on the `ignore` crate rather than
//! hand-rolled recursion. We only need unfiltered directory-walk order
//! (Filter applies, not this stage, per §4.1/§4.2), so gitignore semantics
//! are disabled here -- `ignore::WalkBuilder` is used purely as a
//! well-behaved recursive directory iterator.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::WalkBuilder;
use log::{trace, warn};

use crate::digest::{hash_reader, Digest};
use crate::error::StrataResult;

/// A single observed file, as yielded by the Walker (§3 FileEntry).
///
/// `absolute_path` is not part of the catalog's FileEntry attributes in §3
/// (the catalog only ever persists `relative_path`) -- it is carried here
/// purely so downstream stages (Splitter, Compressor) know where to read
/// the file's bytes from, the way `luke.py`'s `FileEntryDTO` carries both
/// `original_path` and `relative_file`.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub absolute_path: PathBuf,
    /// Source-root-relative suffix, leading separator preserved.
    pub relative_path: String,
    pub size: u64,
    pub mtime: SystemTime,
    /// Populated when `hashing` is requested; left empty for the Filter/
    /// Bulker to fill in later (§4.1 edge case).
    pub sha256: Option<Digest>,
}

/// Walks `root`, yielding a [`FileEntry`] per regular file.
///
/// Symlinks, sockets, and device nodes are skipped silently; `skipped_count`
/// is incremented for each (§4.1, "observable via a counter").
pub struct Walker {
    root: PathBuf,
    hashing: bool,
    skipped_count: u64,
}

impl Walker {
    /// Creates a walker rooted at `root`. `hashing` controls whether each
    /// file is read once to compute its digest inline (§4.1).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, hashing: bool) -> Self {
        Self {
            root: root.into(),
            hashing,
            skipped_count: 0,
        }
    }

    /// Number of non-regular entries skipped so far.
    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        self.skipped_count
    }

    /// Runs the walk to completion, collecting every entry.
    ///
    /// The walk is lazy, finite and non-restartable per §4.1; this library
    /// surfaces it as a one-shot `Vec` rather than a reusable iterator since
    /// the Filter (C2) always consumes the whole stream per run.
    pub fn walk(&mut self) -> StrataResult<Vec<FileEntry>> {
        let mut entries = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .follow_links(false)
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("error walking source tree: {err}");
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                trace!("skipping non-regular entry: {}", entry.path().display());
                self.skipped_count += 1;
                continue;
            }

            let metadata = entry.metadata().map_err(|err| {
                crate::error::StrataError::with_source(
                    crate::error::ErrorKind::SourceIo,
                    format!("failed to read metadata for {}", entry.path().display()),
                    std::io::Error::new(std::io::ErrorKind::Other, err),
                )
            })?;

            let relative_path = relative_path_of(&self.root, entry.path());
            let sha256 = if self.hashing {
                Some(hash_reader(File::open(entry.path())?)?)
            } else {
                None
            };

            entries.push(FileEntry {
                absolute_path: entry.path().to_path_buf(),
                relative_path,
                size: metadata.len(),
                mtime: metadata.modified()?,
                sha256,
            });
        }

        Ok(entries)
    }
}

/// Builds the source-root-relative suffix, preserving the leading separator
/// (§3's identity-key invariant).
fn relative_path_of(root: &Path, path: &Path) -> String {
    let suffix = path.strip_prefix(root).unwrap_or(path);
    let mut relative = String::from(std::path::MAIN_SEPARATOR);
    relative.push_str(&suffix.to_string_lossy());
    relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn walks_regular_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let mut walker = Walker::new(dir.path(), false);
        let mut entries = walker.walk().unwrap();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        assert_eq!(entries.len(), 2);
        assert!(entries[0].relative_path.ends_with("a.txt"));
        assert!(entries[1].relative_path.ends_with("b.txt"));
        assert!(entries.iter().all(|e| e.sha256.is_none()));
    }

    #[test]
    fn hashing_populates_digest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let mut walker = Walker::new(dir.path(), true);
        let entries = walker.walk().unwrap();

        assert_eq!(entries.len(), 1);
        assert!(entries[0].sha256.is_some());
    }

    #[test]
    fn relative_path_keeps_leading_separator() {
        let root = Path::new("/tmp/source");
        let path = Path::new("/tmp/source/dir/file.txt");
        assert_eq!(relative_path_of(root, path), "/dir/file.txt");
    }
}

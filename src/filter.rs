//! C2: Filter.
//!
//! Grounded in `controller.py`'s `FileFilter`: it iterates the Walker's
//! output, emits only new/changed files, and tracks `filtered_files`
//! (renamed `handled` here, per spec.md §4.2) plus `handled_files`
//! (renamed `skipped`) so the driver can compute deletions afterwards.

use std::collections::HashMap;

use crate::digest::{hash, Digest};
use crate::walker::FileEntry;

/// The catalog's current view of the backup set, by relative path, as
/// computed by [`crate::catalog::reader::effective_view`] (§4.8).
pub type EffectiveView = HashMap<String, Digest>;

/// Drops files unchanged since the prior effective backup (§4.2).
///
/// Holds the two bookkeeping maps the driver needs at end-of-run to compute
/// `deleted = catalog.keys - handled.keys - skipped.keys`.
#[derive(Debug, Default)]
pub struct Filter {
    handled: HashMap<String, FileEntry>,
    skipped: HashMap<String, FileEntry>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one Walker entry through the filter, computing a deferred hash
    /// if the entry doesn't carry one yet (§4.2 edge case).
    ///
    /// Returns `Some(entry)` when the entry is new or changed and should
    /// continue down the pipeline; `None` when it matched the catalog
    /// unchanged.
    pub fn apply(&mut self, view: &EffectiveView, mut entry: FileEntry, reader: impl FnOnce() -> std::io::Result<Digest>) -> std::io::Result<Option<FileEntry>> {
        let digest = match entry.sha256 {
            Some(digest) => digest,
            None => {
                let digest = reader()?;
                entry.sha256 = Some(digest);
                digest
            }
        };

        match view.get(&entry.relative_path) {
            Some(catalog_digest) if *catalog_digest == digest => {
                self.skipped.insert(entry.relative_path.clone(), entry);
                Ok(None)
            }
            _ => {
                self.handled.insert(entry.relative_path.clone(), entry.clone());
                Ok(Some(entry))
            }
        }
    }

    /// Relative paths present in the prior view but absent from both
    /// `handled` and `skipped`: these become `DELETED` rows (§4.2).
    #[must_use]
    pub fn deletions<'a>(&self, view: &'a EffectiveView) -> Vec<&'a str> {
        view.keys()
            .filter(|path| !self.handled.contains_key(*path) && !self.skipped.contains_key(*path))
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn handled(&self) -> &HashMap<String, FileEntry> {
        &self.handled
    }

    #[must_use]
    pub fn skipped(&self) -> &HashMap<String, FileEntry> {
        &self.skipped
    }
}

/// Hashes an in-memory buffer, convenience for call sites that already hold
/// bytes rather than a reader (tests, and small files read whole).
#[must_use]
pub fn hash_bytes(data: &[u8]) -> Digest {
    hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn entry(path: &str) -> FileEntry {
        FileEntry {
            absolute_path: std::path::PathBuf::from(path),
            relative_path: path.to_owned(),
            size: 5,
            mtime: SystemTime::now(),
            sha256: Some(hash(b"hello")),
        }
    }

    #[test]
    fn unchanged_file_is_skipped() {
        let mut view = EffectiveView::new();
        view.insert("/a.txt".to_owned(), hash(b"hello"));

        let mut filter = Filter::new();
        let result = filter
            .apply(&view, entry("/a.txt"), || Ok(hash(b"hello")))
            .unwrap();

        assert!(result.is_none());
        assert!(filter.skipped().contains_key("/a.txt"));
        assert!(!filter.handled().contains_key("/a.txt"));
    }

    #[test]
    fn changed_file_is_emitted() {
        let mut view = EffectiveView::new();
        view.insert("/a.txt".to_owned(), hash(b"old content"));

        let mut filter = Filter::new();
        let result = filter
            .apply(&view, entry("/a.txt"), || Ok(hash(b"hello")))
            .unwrap();

        assert!(result.is_some());
        assert!(filter.handled().contains_key("/a.txt"));
    }

    #[test]
    fn new_file_is_emitted() {
        let view = EffectiveView::new();
        let mut filter = Filter::new();
        let result = filter
            .apply(&view, entry("/new.txt"), || Ok(hash(b"hello")))
            .unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn deletion_detection_excludes_handled_and_skipped() {
        let mut view = EffectiveView::new();
        view.insert("/a.txt".to_owned(), hash(b"hello"));
        view.insert("/gone.txt".to_owned(), hash(b"bye"));

        let mut filter = Filter::new();
        filter
            .apply(&view, entry("/a.txt"), || Ok(hash(b"hello")))
            .unwrap();

        let deleted = filter.deletions(&view);
        assert_eq!(deleted, vec!["/gone.txt"]);
    }
}

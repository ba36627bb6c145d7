//! C9: MediumStore.
//!
//! Grounded in `directory.py`'s `BackupDirectoryStorageController`: numbered
//! directories under a destination root, a running used-bytes counter that
//! triggers rotation, a small serialized disc-id record, and a catalog copy
//! dropped into every medium used so any single one is self-describing.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{Cipher, Codec, MediumOptions};
use crate::crypto::Encryptor;
use crate::error::{ErrorKind, StrataError, StrataResult};
use crate::hook::OperatorHook;
use crate::pipeline::ArchivePackage;

/// Renders an id as a 10-digit zero-padded decimal, ordering lexicographically (§4.9).
#[must_use]
pub fn format_id(id: i64) -> String {
    format!("{id:010}")
}

/// Small on-disk record identifying which Disc a medium directory holds
/// (`db.py`'s `disc_id.py` / `DiscId`, §6).
#[derive(Serialize, Deserialize)]
struct DiscIdRecord {
    db_id: i64,
}

/// The archive-file extension contributed by `codec` (and `cipher`, if any).
#[must_use]
pub fn archive_extension(codec: Codec, cipher: Option<Cipher>) -> String {
    match cipher {
        Some(cipher) => format!("tar.{}.{}", codec.extension(), cipher.extension()),
        None => format!("tar.{}", codec.extension()),
    }
}

/// Lays out archive files into numbered medium directories beneath
/// `destination`, rotating once a medium's used bytes would exceed capacity.
pub struct MediumStore {
    destination: PathBuf,
    options: MediumOptions,
    hook: OperatorHook,
    current_dir: Option<PathBuf>,
    current_used_bytes: u64,
    used_dirs: Vec<PathBuf>,
}

impl MediumStore {
    #[must_use]
    pub fn new(destination: PathBuf, options: MediumOptions, hook: OperatorHook) -> Self {
        Self {
            destination,
            options,
            hook,
            current_dir: None,
            current_used_bytes: 0,
            used_dirs: Vec::new(),
        }
    }

    /// True when no medium is open, or the current one plus slack would
    /// reach capacity (§4.9).
    #[must_use]
    pub fn need_new_medium(&self) -> bool {
        match (self.current_dir.as_ref(), self.options.capacity_bytes) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(capacity)) => self.current_used_bytes + self.options.slack_bytes >= capacity,
        }
    }

    /// Creates the numbered directory for `disc_id` and resets the
    /// used-bytes counter (§4.9).
    pub fn open_medium(&mut self, disc_id: i64) -> StrataResult<()> {
        let dir = self.destination.join(format_id(disc_id));
        fs::create_dir_all(&dir)?;
        self.current_dir = Some(dir.clone());
        self.current_used_bytes = 0;
        self.used_dirs.push(dir);
        Ok(())
    }

    /// Copies `package`'s staged file to `<medium>/<archive_id>.<ext>`,
    /// returning the final on-medium file name (for `Archive.name`).
    /// Increments the used-bytes counter (§4.9).
    pub fn store(&mut self, package: &ArchivePackage, archive_id: i64, codec: Codec, cipher: Option<Cipher>) -> StrataResult<String> {
        let dir = self.current_dir.clone().ok_or_else(|| {
            StrataError::new(ErrorKind::SourceIo, "store called with no medium open")
        })?;
        let name = format!("{}.{}", format_id(archive_id), archive_extension(codec, cipher));
        let dest = dir.join(&name);
        fs::copy(&package.staged_path, &dest)?;
        self.current_used_bytes += package.size;
        Ok(name)
    }

    /// Writes the medium-index record and fires the operator hook (§4.9).
    pub fn finalize_medium(&self, disc_id: i64) -> StrataResult<()> {
        let dir = self.current_dir.as_ref().ok_or_else(|| {
            StrataError::new(ErrorKind::SourceIo, "finalize_medium called with no medium open")
        })?;
        let record = DiscIdRecord { db_id: disc_id };
        let path = dir.join(&self.options.index_filename);
        let yaml = serde_yaml::to_string(&record)
            .map_err(|err| StrataError::with_source(ErrorKind::SourceIo, "failed to serialize disc id record", err))?;
        fs::write(&path, yaml)?;
        info!("finalized medium {}", dir.display());
        self.hook.fire("finish_medium", &dir.display().to_string());
        Ok(())
    }

    /// Copies `catalog_path` (encrypting it first if `encryptor` is set)
    /// into every medium directory used this run, deduplicated (§4.9).
    pub fn finalize_backup(&self, catalog_path: &std::path::Path, encryptor: Option<&dyn Encryptor>) -> StrataResult<()> {
        let (source, _temp) = match encryptor {
            None => (catalog_path.to_path_buf(), None),
            Some(encryptor) => {
                let temp = tempfile::NamedTempFile::new()?;
                encryptor.encrypt(catalog_path, temp.path())?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        let ext = match encryptor {
            None => String::new(),
            Some(encryptor) => format!(".{}", encryptor.extension()),
        };
        let filename = format!("{}{}", self.options.catalog_filename, ext);

        let mut seen = HashSet::new();
        for dir in &self.used_dirs {
            if !seen.insert(dir.clone()) {
                continue;
            }
            fs::copy(&source, dir.join(&filename))?;
        }
        Ok(())
    }

    /// Directories created so far this run, in creation order.
    #[must_use]
    pub fn used_dirs(&self) -> &[PathBuf] {
        &self.used_dirs
    }
}

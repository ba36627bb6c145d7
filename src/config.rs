//! Configuration option structs.
//!
//! Shaped after the teacher's `commands::backup::ParentOptions`: plain,
//! `Default`-able, serde-friendly structs composed with `derive_setters` for
//! a fluent builder API, one struct per concern. The `clap`/`merge`
//! `cfg_attr` machinery the teacher uses to double this struct as a CLI
//! argument set is dropped -- the CLI surface is out of scope here.

use std::path::PathBuf;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};

/// Archive compression codec (§4.5). `Bz2` is the default, matching the
/// source's `open_spec='w:bz2'`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Codec {
    /// bzip2-compressed tar
    #[default]
    Bz2,
    /// gzip-compressed tar
    Gz,
    /// lzma-compressed tar
    Xz,
}

impl Codec {
    /// The extension fragment contributed by this codec, e.g. `"bz2"`.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Bz2 => "bz2",
            Self::Gz => "gz",
            Self::Xz => "xz",
        }
    }
}

/// Symmetric cipher for archive/catalog encryption (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Cipher {
    /// passphrase-based, invokes `gpg` as a subprocess
    GpgSymmetric,
    /// length-prefixed + IV + padded ciphertext, implemented in-process
    AesCbcFile,
}

impl Cipher {
    /// The extension fragment contributed by this cipher, e.g. `"gpg"`.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::GpgSymmetric => "gpg",
            Self::AesCbcFile => "aes",
        }
    }
}

/// Backup kind (§3). Forced to `Full` if the prior catalog is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum BackupKind {
    #[default]
    Full,
    Incremental,
}

/// Which progress reporter an engine uses (§6, §9).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    #[default]
    Silent,
    Simple,
    Rich,
}

/// Archive sizing and codec/cipher selection (§4.3-§4.6).
#[derive(Clone, Debug, Serialize, Deserialize, Setters)]
#[serde(default)]
#[setters(into, strip_option)]
#[non_exhaustive]
pub struct ArchiveOptions {
    /// Maximum cumulative size of a Group, and the Splitter's part size. Default 1 GiB.
    pub budget_bytes: u64,
    /// Compression codec applied to every archive.
    pub codec: Codec,
    /// Symmetric cipher applied to every archive and catalog copy, if any.
    pub cipher: Option<Cipher>,
    /// Passphrase used by whichever cipher is configured.
    #[setters(skip)]
    pub passphrase: Option<String>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            budget_bytes: 1 << 30,
            codec: Codec::default(),
            cipher: None,
            passphrase: None,
        }
    }
}

impl ArchiveOptions {
    /// Sets the encryption passphrase. Kept out of `Setters` (`skip`) so it
    /// never leaks into a `{:?}` of the struct via a generated accessor name
    /// that invites logging it; callers still set it through this method.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }
}

/// Medium (disc/tape directory) capacity and layout (§4.9, §6).
#[derive(Clone, Debug, Serialize, Deserialize, Setters)]
#[serde(default)]
#[setters(into)]
#[non_exhaustive]
pub struct MediumOptions {
    /// Capacity in bytes; `None` means unlimited (source's `-1`).
    pub capacity_bytes: Option<u64>,
    /// Reserved slack; a medium rotates once `used + slack >= capacity`.
    pub slack_bytes: u64,
    /// Filename of the medium-index record written by `finalize_medium`.
    pub index_filename: String,
    /// Filename of the catalog copy written by `finalize_backup`.
    pub catalog_filename: String,
}

impl Default for MediumOptions {
    fn default() -> Self {
        Self {
            capacity_bytes: Some(44 * (1 << 30)),
            slack_bytes: 100 * (1 << 20),
            index_filename: "disc_id.yml".to_owned(),
            catalog_filename: "index.sqlite".to_owned(),
        }
    }
}

/// Parallel-pipeline tuning (§5).
#[derive(Clone, Debug, Serialize, Deserialize, Setters)]
#[serde(default)]
#[setters(into)]
#[non_exhaustive]
pub struct ConcurrencyOptions {
    /// If false, runs the single-threaded pipeline mode (§4.7).
    pub enabled: bool,
    /// Worker pool size. `None` runs on `rayon`'s ambient global pool
    /// (itself CPU-count sized); `Some(n)` builds a dedicated pool of `n`
    /// threads for this run instead.
    pub workers: Option<usize>,
    /// Maximum number of archives in flight between Bulker and `MediumStore`.
    pub backpressure_budget: usize,
}

impl Default for ConcurrencyOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: None,
            backpressure_budget: 5,
        }
    }
}

/// Top-level options for a backup run.
#[derive(Clone, Debug, Serialize, Deserialize, Setters)]
#[serde(default)]
#[setters(into, strip_option)]
#[non_exhaustive]
pub struct EngineOptions {
    /// Directory walked for source files.
    pub source: PathBuf,
    /// Destination root; medium directories are created directly beneath it.
    pub destination: PathBuf,
    /// Catalog location, relative paths resolve against `destination`.
    pub catalog_path: PathBuf,
    /// Requested backup kind; forced to `Full` if the prior catalog is empty.
    pub kind: BackupKind,
    pub archive: ArchiveOptions,
    pub medium: MediumOptions,
    pub concurrency: ConcurrencyOptions,
    pub progress: ProgressKind,
    /// Operator hook command, invoked with the finalized medium path.
    pub hook_command: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            catalog_path: PathBuf::from("catalog.sqlite"),
            kind: BackupKind::default(),
            archive: ArchiveOptions::default(),
            medium: MediumOptions::default(),
            concurrency: ConcurrencyOptions::default(),
            progress: ProgressKind::default(),
            hook_command: None,
        }
    }
}

/// Options for a restore run (§4.10).
#[derive(Clone, Debug, Serialize, Deserialize, Setters)]
#[serde(default)]
#[setters(into, strip_option)]
#[non_exhaustive]
pub struct RestoreOptions {
    /// Directory that may contain any subset of media.
    pub source: PathBuf,
    /// Destination directory for reconstructed files.
    pub destination: PathBuf,
    /// Regex over `relative_path`; default matches everything.
    pub filter: String,
    /// Passphrase, if the catalog/archives are encrypted.
    pub passphrase: Option<String>,
    pub cipher: Option<Cipher>,
    pub medium: MediumOptions,
    /// Operator hook command, invoked once restore finishes.
    pub hook_command: Option<String>,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            filter: ".*".to_owned(),
            passphrase: None,
            cipher: None,
            medium: MediumOptions::default(),
            hook_command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_options_default_budget_is_one_gib() {
        assert_eq!(ArchiveOptions::default().budget_bytes, 1 << 30);
    }

    #[test]
    fn medium_options_default_matches_spec() {
        let medium = MediumOptions::default();
        assert_eq!(medium.capacity_bytes, Some(44 * (1 << 30)));
        assert_eq!(medium.slack_bytes, 100 * (1 << 20));
        assert_eq!(medium.index_filename, "disc_id.yml");
        assert_eq!(medium.catalog_filename, "index.sqlite");
    }

    #[test]
    fn concurrency_defaults_to_backpressure_budget_five() {
        assert_eq!(ConcurrencyOptions::default().backpressure_budget, 5);
    }

    #[test]
    fn codec_extension_matches_spec_table() {
        assert_eq!(Codec::Bz2.extension(), "bz2");
        assert_eq!(Codec::Gz.extension(), "gz");
        assert_eq!(Codec::Xz.extension(), "xz");
    }

    #[test]
    fn setters_build_fluently() {
        let opts = ArchiveOptions::default()
            .codec(Codec::Xz)
            .with_passphrase("secret");
        assert_eq!(opts.codec, Codec::Xz);
        assert_eq!(opts.passphrase.as_deref(), Some("secret"));
    }
}

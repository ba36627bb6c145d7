/*!
A library for incremental, medium-aware, encrypted backups with a relational
catalog.

# Overview

The main entry points are the free functions [`run_backup`] and
[`run_restore`], each driving one full pipeline pass: [`run_backup`] walks a
source tree, filters it against the catalog's effective view, bulks and
compresses/encrypts the result into archives, lays those out across numbered
medium directories, and writes the catalog transactionally; [`run_restore`]
inverts this, planning archive fetches from a catalog copy and reassembling
any split files.

Each direction is configured with a plain options struct -- [`EngineOptions`]
for backup, [`RestoreOptions`] for restore -- built with setter methods and
serde-friendly so they can be loaded from a config file.

# Example - back up a directory, then restore it elsewhere

```rust,no_run
use strata_core::{EngineOptions, RestoreOptions, run_backup, run_restore};

let options = EngineOptions::default()
    .source("/srv/data")
    .destination("/mnt/medium-0")
    .catalog_path("/mnt/medium-0/index.sqlite");
let summary = run_backup(&options).unwrap();
println!("{} new file(s) archived", summary.files_new);

let restore_options = RestoreOptions::default()
    .source("/mnt/medium-0")
    .destination("/tmp/restored");
run_restore(&restore_options).unwrap();
```

# Crate features

- **rich-progress** - Enables an `indicatif`-backed terminal progress bar
  ([`progress::Rich`]). *Disabled by default.*
*/

pub(crate) mod archive;
pub(crate) mod bulk;
pub mod catalog;
pub(crate) mod config;
pub(crate) mod crypto;
pub(crate) mod digest;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod filter;
pub(crate) mod hook;
pub(crate) mod medium;
pub(crate) mod pipeline;
pub mod progress;
pub(crate) mod restore;
pub(crate) mod split;
pub(crate) mod walker;

pub use crate::{
    catalog::{ArchiveLocation, Catalog, FileInfo},
    config::{
        ArchiveOptions, BackupKind, Cipher, Codec, ConcurrencyOptions, EngineOptions,
        MediumOptions, ProgressKind, RestoreOptions,
    },
    crypto::Encryptor,
    digest::Digest,
    engine::{run_backup, run_restore, BackupSummary},
    error::{ErrorKind, StrataError, StrataResult},
    hook::OperatorHook,
    progress::{HiddenProgress, Progress, ProgressBars, ProgressType, Silent, Simple},
    walker::FileEntry,
};

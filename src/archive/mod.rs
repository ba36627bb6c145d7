//! C5: Compressor.
//!
//! Grounded in `archive.py`'s `DefaultArchiver` (`compress_files`,
//! `decompress_files`): writes a `tar` archive into a codec-compressed
//! stream, preserving file size; the inverse extracts only the requested
//! entries, raising `ExtractMissing` (§4.5) for anything absent.

pub mod codec;

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use tar::{Builder, Header};

use self::codec::CompressingWriter;
use crate::config::Codec;
use crate::error::{ErrorKind, StrataError, StrataResult};

/// One file destined for an archive: the bytes live at `src_path` on disk,
/// but are recorded in the archive under `entry_name` (§4.5's split-part
/// case: entry name is the part's logical relative path, bytes come from
/// the staged temp file).
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub entry_name: String,
    pub src_path: PathBuf,
    pub size: u64,
}

/// Strips the leading separator from a relative path for tar portability
/// (§4.5: "entries named by relative_path, leading separator stripped").
fn tar_entry_name(relative_path: &str) -> String {
    relative_path.trim_start_matches(['/', '\\']).to_owned()
}

/// Writes a compressed archive containing every entry in `group`.
pub fn archive(group: &[ArchiveEntry], out_path: &Path, codec: Codec) -> StrataResult<()> {
    let out = File::create(out_path)?;
    let writer = codec::compressing_writer(codec, out);
    let mut builder = Builder::new(writer);

    for entry in group {
        let mut header = Header::new_gnu();
        header.set_size(entry.size);
        header.set_mode(0o644);
        header.set_cksum();
        let mut source = File::open(&entry.src_path)?;
        builder
            .append_data(&mut header, tar_entry_name(&entry.entry_name), &mut source)
            .map_err(|err| {
                StrataError::with_source(
                    ErrorKind::CodecFailure,
                    format!("failed to append {} to archive", entry.entry_name),
                    err,
                )
            })?;
    }

    let writer = builder
        .into_inner()
        .map_err(|err| StrataError::with_source(ErrorKind::CodecFailure, "failed to finalize tar stream", err))?;
    finish_writer(writer)
}

/// Writes a compressed archive containing exactly one entry -- used for
/// split parts (§4.5).
pub fn archive_single(src_path: &Path, entry_name: &str, out_path: &Path, codec: Codec) -> StrataResult<()> {
    let size = std::fs::metadata(src_path)?.len();
    archive(
        &[ArchiveEntry {
            entry_name: entry_name.to_owned(),
            src_path: src_path.to_owned(),
            size,
        }],
        out_path,
        codec,
    )
}

fn finish_writer(writer: CompressingWriter) -> StrataResult<()> {
    writer
        .finish()
        .map_err(|err| StrataError::with_source(ErrorKind::CodecFailure, "failed to finalize compressed archive", err))
}

/// Extracts only `relative_paths` from `archive_path` into `out_dir`, at
/// their archived paths. A requested entry absent from the archive is
/// `ExtractMissing` (§4.5).
pub fn extract(archive_path: &Path, relative_paths: &[String], out_dir: &Path) -> StrataResult<()> {
    let reader = codec::decompressing_reader(archive_path)?;
    let mut archive = tar::Archive::new(reader);

    let mut wanted: HashSet<String> = relative_paths.iter().map(|p| tar_entry_name(p)).collect();

    let entries = archive
        .entries()
        .map_err(|err| StrataError::with_source(ErrorKind::CodecFailure, "failed to read tar entries", err))?;

    for entry in entries {
        let mut entry = entry.map_err(|err| StrataError::with_source(ErrorKind::CodecFailure, "corrupt tar entry", err))?;
        let path = entry
            .path()
            .map_err(|err| StrataError::with_source(ErrorKind::CodecFailure, "invalid tar entry path", err))?
            .to_path_buf();
        let name = path.to_string_lossy().to_string();

        if !wanted.remove(&name) {
            continue;
        }

        let dest = out_dir.join(&path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        std::io::copy(&mut entry, &mut out)?;
    }

    if let Some(missing) = wanted.into_iter().next() {
        return Err(StrataError::new(
            ErrorKind::ExtractMissing,
            format!("entry {missing} not found in {}", archive_path.display()),
        ));
    }

    Ok(())
}

//! C4: Splitter.
//!
//! Grounded in `multi/archive.py`'s `split_file`: reads the oversize source
//! in small blocks, accumulating into a budget-sized temp file, rotating to
//! a new one at the boundary. Part indices are 0-based, monotonic, and
//! every part is emitted (Open Question 2 in spec.md §9 -- this crate always
//! iterates to completion, never returns early).

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StrataResult;

/// 1 KiB: "the smallest legitimate split granule" (§4.4).
const READ_BLOCK: usize = 1024;

/// One byte-range part of an oversize file, staged to its own temp file.
#[derive(Debug)]
pub struct Part {
    pub index: u32,
    pub size: u64,
    pub path: PathBuf,
    _temp: NamedTempFile,
}

/// Streams `src` into a sequence of [`Part`]s, each at most `budget` bytes.
///
/// If `src`'s length is an exact multiple of `budget`, the would-be final
/// part reads zero bytes at its start and is not emitted (§4.4).
pub fn split_file(src: &Path, budget: u64) -> StrataResult<Vec<Part>> {
    let mut source = File::open(src)?;
    let mut parts = Vec::new();
    let mut index: u32 = 0;
    let mut read_buf = vec![0_u8; READ_BLOCK];

    loop {
        let mut temp = NamedTempFile::new()?;
        let mut part_size: u64 = 0;
        let mut wrote_anything = false;

        while part_size < budget {
            let want = READ_BLOCK.min((budget - part_size) as usize);
            let read = source.read(&mut read_buf[..want])?;
            if read == 0 {
                break;
            }
            temp.write_all(&read_buf[..read])?;
            part_size += read as u64;
            wrote_anything = true;
        }

        if !wrote_anything {
            break;
        }

        let path = temp.path().to_path_buf();
        parts.push(Part {
            index,
            size: part_size,
            path,
            _temp: temp,
        });
        index += 1;
    }

    Ok(parts)
}

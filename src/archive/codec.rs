//! Compression codecs (§4.5, §9 "Pluggable codecs/ciphers").
//!
//! Grounded in `archive.py`'s `DefaultArchiver`, which opens a Python
//! `tarfile` with `open_spec='w:bz2'`. Here each [`Codec`] wraps a `tar`
//! archive in one of the three supported compression streams; decompression
//! auto-detects the stream from its magic bytes so restore stays
//! codec-agnostic (§9).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression as BzCompression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::config::Codec;
use crate::error::{ErrorKind, StrataError, StrataResult};

/// Magic bytes used to auto-detect a compressed-tar stream on decompression.
const BZ2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68]; // "BZh"
const GZ_MAGIC: [u8; 2] = [0x1F, 0x8B];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// A compressing writer over one of the three supported codecs.
///
/// Kept as an enum rather than `Box<dyn Write>` so callers can reach each
/// encoder's concrete `finish()` -- the only place these crates surface a
/// finalization error (e.g. the last disk write failing while the
/// CRC/footer/index trailer is written out). `Write::flush` alone does not
/// call it, and letting the encoder fall out of scope runs its `Drop`,
/// which calls `try_finish()` and discards the result.
pub(crate) enum CompressingWriter {
    Bz2(BzEncoder<File>),
    Gz(GzEncoder<File>),
    Xz(XzEncoder<File>),
}

impl Write for CompressingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Bz2(w) => w.write(buf),
            Self::Gz(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Bz2(w) => w.flush(),
            Self::Gz(w) => w.flush(),
            Self::Xz(w) => w.flush(),
        }
    }
}

impl CompressingWriter {
    /// Writes the codec's trailer and surfaces any finalization error,
    /// instead of leaving it to a discarded `Drop::try_finish`.
    pub(crate) fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Bz2(w) => w.finish().map(|_| ()),
            Self::Gz(w) => w.finish().map(|_| ()),
            Self::Xz(w) => w.finish().map(|_| ()),
        }
    }
}

/// Wraps a writer with the codec's compression stream.
pub(crate) fn compressing_writer(codec: Codec, out: File) -> CompressingWriter {
    match codec {
        Codec::Bz2 => CompressingWriter::Bz2(BzEncoder::new(out, BzCompression::default())),
        Codec::Gz => CompressingWriter::Gz(GzEncoder::new(out, GzCompression::default())),
        Codec::Xz => CompressingWriter::Xz(XzEncoder::new(out, 6)),
    }
}

/// Opens a decompressing reader over `path`, auto-detecting the codec from
/// its header (§9: "decompression must accept any supported compressed-tar
/// variant").
pub(crate) fn decompressing_reader(path: &Path) -> StrataResult<Box<dyn Read>> {
    let mut file = File::open(path)?;
    let mut header = [0_u8; 6];
    let read = file.read(&mut header)?;
    // reopen rather than seek-rewind through the generic `Read`, keeping this
    // function trivially correct regardless of the underlying file's cursor
    // semantics.
    let mut file = File::open(path)?;

    if read >= 3 && header[..3] == BZ2_MAGIC {
        return Ok(Box::new(BzDecoder::new(file)));
    }
    if read >= 2 && header[..2] == GZ_MAGIC {
        return Ok(Box::new(GzDecoder::new(file)));
    }
    if read >= 6 && header == XZ_MAGIC {
        return Ok(Box::new(XzDecoder::new(file)));
    }

    drop(file);
    Err(StrataError::new(
        ErrorKind::CodecFailure,
        format!("{}: unrecognized compression header", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use tempfile::tempdir;

    #[test]
    fn bz2_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bz2");
        {
            let file = File::create(&path).unwrap();
            let mut writer = compressing_writer(Codec::Bz2, file);
            writer.write_all(b"hello bzip2").unwrap();
            writer.finish().unwrap();
        }
        let mut reader = decompressing_reader(&path).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello bzip2");
    }

    #[test]
    fn gz_auto_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.gz");
        {
            let file = File::create(&path).unwrap();
            let mut writer = compressing_writer(Codec::Gz, file);
            writer.write_all(b"hello gzip").unwrap();
            writer.finish().unwrap();
        }
        let mut reader = decompressing_reader(&path).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello gzip");
    }

    #[test]
    fn xz_auto_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.xz");
        {
            let file = File::create(&path).unwrap();
            let mut writer = compressing_writer(Codec::Xz, file);
            writer.write_all(b"hello xz").unwrap();
            writer.finish().unwrap();
        }
        let mut reader = decompressing_reader(&path).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello xz");
    }
}

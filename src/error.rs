//! Error types and Result module.

use std::fmt::{self, Display};

/// Result type that is being returned from methods that can fail and thus have [`StrataError`]s.
pub type StrataResult<T, E = Box<StrataError>> = Result<T, E>;

/// The error type returned throughout this crate.
///
/// Modeled after the context-carrying error used by `rustic_core`: a kind, an
/// optional source, a human guidance message and free-form context pairs.
#[derive(thiserror::Error, Debug)]
pub struct StrataError {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    guidance: String,
    context: Vec<(&'static str, String)>,
}

impl Display for StrataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} occurred in `strata_core`", self.kind)?;
        write!(f, "\n\nMessage:\n{}", self.guidance)?;
        if !self.context.is_empty() {
            write!(f, "\n\nContext:\n")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(",\n")
            )?;
        }
        if let Some(cause) = &self.source {
            write!(f, "\n\nCaused by: {cause}")?;
        }
        Ok(())
    }
}

impl StrataError {
    /// Creates a new error with the given kind and guidance.
    pub fn new(kind: ErrorKind, guidance: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            kind,
            guidance: guidance.into(),
            context: Vec::new(),
            source: None,
        })
    }

    /// Creates a new error from a given error, preserving it as the source.
    pub fn with_source(
        kind: ErrorKind,
        guidance: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Box<Self> {
        Box::new(Self {
            kind,
            guidance: guidance.into(),
            context: Vec::new(),
            source: Some(source.into()),
        })
    }

    /// The kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Attach additional context to the error.
    pub fn attach_context(mut self: Box<Self>, key: &'static str, value: impl Into<String>) -> Box<Self> {
        self.context.push((key, value.into()));
        self
    }
}

/// [`ErrorKind`] describes the taxonomy of errors from spec §7.
///
/// `MediumFull` is deliberately absent: used-bytes-plus-next-archive-size
/// exceeding capacity is a rotation trigger, not a failure (§7), and never
/// becomes an `ErrorKind`. `HookFailure` is likewise absent at this level --
/// [`crate::hook::OperatorHook`] logs and swallows it, per §7's "non-fatal".
#[non_exhaustive]
#[derive(thiserror::Error, Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// cannot read a source file or directory entry
    SourceIo,
    /// catalog is corrupt (schema mismatch, missing join row, foreign-key violation)
    CatalogCorrupt,
    /// compression or decompression failed
    CodecFailure,
    /// encryption or decryption failed
    CipherFailure,
    /// requested entry was not found in an archive during restore
    ExtractMissing,
    /// restore planner made no progress across a full scan of available media
    LoopBudgetExceeded,
    /// a sized worker pool failed to initialize
    ConcurrencyInit,
}

impl From<std::io::Error> for Box<StrataError> {
    fn from(err: std::io::Error) -> Self {
        StrataError::with_source(ErrorKind::SourceIo, err.to_string(), err)
    }
}

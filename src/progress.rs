//! Progress reporting.
//!
//! Pipeline stages (C1-C10) hold a [`ProgressBars`] trait object and never a
//! concrete type, exactly as the teacher's `archiver.rs` does -- core logic
//! stays agnostic to whether anyone is watching.

use std::sync::Arc;

use log::info;

use crate::config::ProgressKind;

/// Builds the configured [`ProgressBars`] factory (§10.5).
#[must_use]
pub fn build(kind: ProgressKind) -> Box<dyn ProgressBars> {
    match kind {
        ProgressKind::Silent => Box::new(Silent),
        ProgressKind::Simple => Box::new(Simple),
        #[cfg(feature = "rich-progress")]
        ProgressKind::Rich => Box::new(rich::Rich),
        #[cfg(not(feature = "rich-progress"))]
        ProgressKind::Rich => Box::new(Simple),
    }
}

/// A progress indicator for a single unit of work (one medium, one archive, ...).
#[derive(Debug, Clone)]
pub struct Progress(Arc<dyn StrataProgress>);

impl Progress {
    /// Wraps a concrete progress implementation.
    pub fn new<P: StrataProgress>(p: P) -> Self {
        Self(Arc::new(p))
    }

    /// A progress indicator that reports nothing.
    #[must_use]
    pub fn hidden() -> Self {
        Self(Arc::new(HiddenProgress))
    }

    /// Sets the total length (bytes or item count, per [`ProgressType`]).
    pub fn set_length(&self, len: u64) {
        self.0.set_length(len);
    }

    /// Sets the title shown alongside the indicator.
    pub fn set_title(&self, title: &str) {
        self.0.set_title(title);
    }

    /// Advances the indicator by `inc` units.
    pub fn inc(&self, inc: u64) {
        self.0.inc(inc);
    }

    /// Marks the indicator as finished.
    pub fn finish(&self) {
        self.0.finish();
    }
}

/// Implement this to surface backup/restore progress to an embedding application.
pub trait StrataProgress: Send + Sync + 'static + std::fmt::Debug {
    /// Whether this implementation renders anything at all.
    fn is_hidden(&self) -> bool;
    /// Sets the total length of the unit of work.
    fn set_length(&self, len: u64);
    /// Sets a human-readable title.
    fn set_title(&self, title: &str);
    /// Advances progress.
    fn inc(&self, inc: u64);
    /// Marks the unit of work as finished.
    fn finish(&self);
}

/// What is being measured by a [`Progress`].
#[derive(Debug, Clone, Copy)]
pub enum ProgressType {
    /// files walked or filtered, counted one at a time
    Counter,
    /// bytes written to the current medium
    Bytes,
}

/// A factory for [`Progress`] instances, one per reporting backend.
pub trait ProgressBars: std::fmt::Debug + Send + Sync + 'static {
    /// Starts a new progress indicator of the given type and title.
    fn progress(&self, progress_type: ProgressType, prefix: &str) -> Progress;
}

/// Reports nothing. The default for library consumers that don't care.
#[derive(Clone, Copy, Debug)]
pub struct HiddenProgress;

impl StrataProgress for HiddenProgress {
    fn is_hidden(&self) -> bool {
        true
    }
    fn set_length(&self, _len: u64) {}
    fn set_title(&self, _title: &str) {}
    fn inc(&self, _inc: u64) {}
    fn finish(&self) {}
}

/// `Silent`: produces no output of any kind.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl ProgressBars for Silent {
    fn progress(&self, _progress_type: ProgressType, _prefix: &str) -> Progress {
        Progress::new(HiddenProgress)
    }
}

/// Logs titles and completions at `info!`, advances silently.
#[derive(Clone, Copy, Debug)]
struct SimpleProgress;

impl StrataProgress for SimpleProgress {
    fn is_hidden(&self) -> bool {
        true
    }
    fn set_length(&self, _len: u64) {}
    fn set_title(&self, title: &str) {
        info!("{title}");
    }
    fn inc(&self, _inc: u64) {}
    fn finish(&self) {
        info!("finished.");
    }
}

/// `Simple`: one log line per stage via the `log` facade, no terminal UI.
#[derive(Clone, Copy, Debug, Default)]
pub struct Simple;

impl ProgressBars for Simple {
    fn progress(&self, _progress_type: ProgressType, prefix: &str) -> Progress {
        info!("{prefix}");
        Progress::new(SimpleProgress)
    }
}

#[cfg(feature = "rich-progress")]
pub use rich::Rich;

#[cfg(feature = "rich-progress")]
mod rich {
    use super::{Progress, ProgressBars, ProgressType, StrataProgress};
    use indicatif::{ProgressBar, ProgressStyle};

    /// `Rich`: renders an actual terminal progress bar via `indicatif`.
    #[derive(Debug, Clone, Default)]
    pub struct Rich;

    impl StrataProgress for ProgressBar {
        fn is_hidden(&self) -> bool {
            false
        }
        fn set_length(&self, len: u64) {
            ProgressBar::set_length(self, len);
        }
        fn set_title(&self, title: &str) {
            self.set_message(title.to_string());
        }
        fn inc(&self, inc: u64) {
            ProgressBar::inc(self, inc);
        }
        fn finish(&self) {
            ProgressBar::finish(self);
        }
    }

    impl ProgressBars for Rich {
        fn progress(&self, progress_type: ProgressType, prefix: &str) -> Progress {
            let style = match progress_type {
                ProgressType::Counter => "{msg} {pos}/{len}",
                ProgressType::Bytes => "{msg} {bytes}/{total_bytes}",
            };
            let bar = ProgressBar::new(0);
            bar.set_style(ProgressStyle::with_template(style).unwrap());
            bar.set_message(prefix.to_string());
            Progress::new(bar)
        }
    }
}

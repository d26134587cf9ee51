//! Structured logger with per-fragment summary collection.
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::STAGE_TARGET;
use super::types::FragmentEntry;
use super::file::log_file_path;
use crate::session::{FragmentStatus, SessionReport};

/// Structured logger with per-fragment summary collection.
///
/// All messages are always written to a persistent log file at
/// `$XDG_CACHE_HOME/cfgpatch/<command>.log` (default `~/.cache/cfgpatch/<command>.log`)
/// with timestamps and ANSI codes stripped, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    fragments: Mutex<Vec<FragmentEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Stores the log file path for display in the run summary. The log file
    /// itself is created by [`init_subscriber`](super::subscriber::init_subscriber);
    /// this constructor does not write to it.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            fragments: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    // A panic while recording must not lose the entries gathered so far.
    fn entries(&self) -> MutexGuard<'_, Vec<FragmentEntry>> {
        self.fragments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a clone of all recorded fragment entries.
    #[must_use]
    pub fn fragment_entries(&self) -> Vec<FragmentEntry> {
        self.entries().clone()
    }

    /// Record a fragment result for the summary.
    pub fn record_fragment(
        &self,
        source: &str,
        identity: Option<&str>,
        status: FragmentStatus,
        message: Option<&str>,
    ) {
        self.entries().push(FragmentEntry {
            source: source.to_string(),
            identity: identity.map(String::from),
            status,
            message: message.map(String::from),
        });
    }

    /// Record every fragment of a finished session, attaching the error
    /// message to skipped ones.
    pub fn record_report(&self, report: &SessionReport) {
        for fragment in &report.fragments {
            let message = report
                .errors
                .iter()
                .find(|e| e.index() == fragment.index)
                .map(ToString::to_string);
            self.record_fragment(
                fragment.source.as_str(),
                fragment.identity.as_deref(),
                fragment.status,
                message.as_deref(),
            );
        }
    }

    /// Return `true` if any recorded fragment has failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Count the number of failed fragments.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.entries()
            .iter()
            .filter(|f| f.status == FragmentStatus::Failed)
            .count()
    }

    /// Print the summary of all recorded fragments.
    pub fn print_summary(&self) {
        let fragments = self.fragment_entries();
        if fragments.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut merged = 0u32;
        let mut skipped = 0u32;
        let mut failed = 0u32;

        for fragment in &fragments {
            let (icon, color) = match fragment.status {
                FragmentStatus::Merged => {
                    merged += 1;
                    ("✓", "\x1b[32m")
                }
                FragmentStatus::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                FragmentStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = fragment
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", fragment.label()));
        }

        let total = merged + skipped + failed;
        self.info(&format!(
            "{total} fragments: \x1b[32m{merged} merged\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

// Routing to console and file lives in the subscriber layers.
#[allow(clippy::unused_self)]
impl Logger {
    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }
}

//! Persistent per-command log file under the user cache directory.
use std::borrow::Cow;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tracing::Level;

use super::STAGE_TARGET;
use super::subscriber::{MessageExtractor, short_target};

/// Path of the log file for `command`: `$XDG_CACHE_HOME/cfgpatch/<command>.log`,
/// falling back to `$HOME/.cache`. The directory is created on demand.
///
/// Returns `None` when neither variable is set or the directory cannot be
/// created; the run then goes without a log file.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    let cache = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    let dir = cache.join("cfgpatch");
    fs::create_dir_all(&dir).ok()?;
    Some(dir.join(format!("{command}.log")))
}

/// Remove the colour codes the console formatter and the run summary emit.
///
/// Only SGR sequences (`ESC [ ... m`) are produced by cfgpatch, so anything
/// else is passed through untouched.
pub(super) fn strip_colors(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some((before, after)) = rest.split_once("\x1b[") {
        out.push_str(before);
        let params = after.trim_start_matches(|c: char| c.is_ascii_digit() || c == ';');
        if let Some(remaining) = params.strip_prefix('m') {
            rest = remaining;
        } else {
            out.push_str("\x1b[");
            rest = after;
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// A [`tracing_subscriber::Layer`] appending every event to the command's
/// log file, timestamped and without colour codes.
///
/// The file is truncated at the start of each run and receives `debug`
/// events even when the console is not verbose, so engine decisions such
/// as overrides and skipped forward declarations can be reviewed after a
/// failed merge.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log file for `command` and write the run header.
    ///
    /// Returns `None` if the file cannot be created.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let version = option_env!("CFGPATCH_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
        let started = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        fs::write(&path, format!("# cfgpatch {version} {command}, started {started}\n")).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }

    fn format_line(level: Level, target: &str, msg: &str) -> String {
        let ts = chrono::Utc::now().format("%H:%M:%S%.3f");
        match level {
            Level::INFO if target == STAGE_TARGET => format!("[{ts}] ==> {msg}"),
            Level::INFO => format!("[{ts}]     {msg}"),
            Level::ERROR => format!("[{ts}]     [error] {msg}"),
            Level::WARN => format!("[{ts}]     [warn] {msg}"),
            _ => format!("[{ts}]     [debug] {}: {msg}", short_target(target)),
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let message = MessageExtractor::extract(event);
        let line = Self::format_line(
            *metadata.level(),
            metadata.target(),
            &strip_colors(&message),
        );
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{line}").ok();
    }
}

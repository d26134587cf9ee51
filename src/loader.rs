//! Fragment discovery on disk.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::registry::FragmentSource;

/// Expand `paths` into the list of fragment files to load.
///
/// Files are taken as given regardless of extension. Directories are walked
/// recursively and contribute every file whose extension matches one of
/// `extensions` (case-insensitive). The result is sorted and deduplicated so
/// the input sequence does not depend on directory iteration order.
///
/// # Errors
///
/// Returns an error if a path does not exist or a directory cannot be walked.
pub fn discover(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.with_context(|| format!("walking {}", path.display()))?;
                if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                    files.push(entry.into_path());
                }
            }
        } else {
            anyhow::bail!("no such file or directory: {}", path.display());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Read every discovered file into a [`FragmentSource`] whose source
/// reference is the file path.
///
/// # Errors
///
/// Returns an error if discovery fails or a file cannot be read as UTF-8.
pub fn load_fragments(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<FragmentSource>> {
    discover(paths, extensions)?
        .iter()
        .map(|file| {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            tracing::debug!("loaded {} ({} bytes)", file.display(), text.len());
            Ok(FragmentSource::new(file.display().to_string(), text))
        })
        .collect()
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

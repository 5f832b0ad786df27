//! Corpus enumeration: lists the files of a directory that a scan should look at.
//!
//! Files are selected by matching their *file name* against a glob pattern such as `*.txt`.
//! The returned list is sorted, so partitioning is reproducible regardless of the order
//! in which the platform returns directory entries.
use glob::Pattern;
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::errors::{ScanError, ScanResult};

/// Checks whether a path's file name matches the glob pattern
pub fn matches_pattern(path: &Path, pattern: &Pattern) -> bool {
    path.file_name()
        .map(|name| pattern.matches(&name.to_string_lossy()))
        .unwrap_or(false)
}

/// Lists files under `root` whose names match `file_pattern`, sorted by path.
///
/// Directories are never returned. Entries that cannot be inspected (dangling links,
/// races with deletion) are still returned so that the owning worker records them as
/// unreadable instead of them silently vanishing from the totals.
pub fn enumerate_files(root: &Path, file_pattern: &str, recursive: bool) -> ScanResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ScanError::directory_not_found(root));
    }

    let pattern = Pattern::new(file_pattern).map_err(|e| {
        ScanError::invalid_configuration(format!("invalid file pattern '{}': {}", file_pattern, e))
    })?;

    let mut files = if recursive {
        walk_recursive(root, &pattern)
    } else {
        list_directory(root, &pattern)?
    };

    files.sort();
    debug!(
        "Found {} files matching '{}' in {}",
        files.len(),
        file_pattern,
        root.display()
    );
    Ok(files)
}

fn list_directory(root: &Path, pattern: &Pattern) -> ScanResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() || !matches_pattern(&path, pattern) {
            continue;
        }
        trace!("Adding file: {}", path.display());
        files.push(path);
    }
    Ok(files)
}

fn walk_recursive(root: &Path, pattern: &Pattern) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(false);

    builder
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping entry during walk: {}", e);
                None
            }
        })
        .filter(|entry| entry.depth() > 0)
        .map(|entry| entry.into_path())
        .filter(|path| !path.is_dir() && matches_pattern(path, pattern))
        .inspect(|path| trace!("Adding file: {}", path.display()))
        .collect()
}

// src/watch/scanner.rs

//! Modified-file scanning against the last-event watermark.
//!
//! The scanner is the leaf both backends share: walk the tree (or just the
//! immediate children of a few directories), drop ignored paths, keep files
//! whose mtime is at or after the watermark, and return them as sorted
//! root-relative strings with forward slashes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::watch::ignores::IgnoreSet;

/// Recursively scan `root` for files modified at or after `watermark`.
///
/// Ignored directories are pruned from the walk entirely, so a large
/// `target/` or `.git/` costs nothing. The comparison is `>=`: a file
/// stamped in the same instant the watermark was taken counts as modified,
/// at worst it is reported once more rather than lost.
pub fn scan_tree(root: &Path, watermark: SystemTime, ignores: &IgnoreSet) -> Vec<String> {
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !entry_ignored(root, e.path(), ignores));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("error walking {:?}: {err}", root);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_str(root, entry.path()) else {
            continue;
        };
        if modified_at(entry.path()).is_some_and(|t| t >= watermark) {
            found.push(rel);
        }
    }

    found.sort();
    found
}

/// Scan only the immediate children of the given directories.
///
/// `dirs` may be absolute or relative to `root`. Used by the native backend,
/// which learns *which* directories changed and only needs to look inside
/// those.
pub fn scan_dirs(
    root: &Path,
    dirs: &[PathBuf],
    watermark: SystemTime,
    ignores: &IgnoreSet,
) -> Vec<String> {
    let mut found = Vec::new();

    for dir in dirs {
        let abs = if dir.is_absolute() {
            dir.clone()
        } else {
            root.join(dir)
        };
        let entries = match fs::read_dir(&abs) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("skipping unreadable directory {:?}: {err}", abs);
                continue;
            }
        };
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(rel) = relative_str(root, &path) else {
                continue;
            };
            if ignores.is_ignored(&rel) {
                continue;
            }
            if modified_at(&path).is_some_and(|t| t >= watermark) {
                found.push(rel);
            }
        }
    }

    found.sort();
    found.dedup();
    found
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// This is intentionally robust:
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
/// - Only if both attempts fail do we give up.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    // Fast path: path already starts with our root.
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    // More robust path: canonicalize both, then try again. This helps on
    // platforms (notably macOS) where different absolute prefixes may be
    // used for the same underlying directory (e.g. symlinks, /private/var).
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

fn entry_ignored(root: &Path, path: &Path, ignores: &IgnoreSet) -> bool {
    match relative_str(root, path) {
        // The walk root itself relativizes to "".
        Some(rel) if rel.is_empty() => false,
        Some(rel) => ignores.is_ignored(&rel),
        None => false,
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

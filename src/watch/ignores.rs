// src/watch/ignores.rs

//! Paths excluded from change detection.
//!
//! An [`IgnoreSet`] combines directory prefixes (a built-in default list
//! plus anything appended at runtime) with glob patterns. All matching is
//! against root-relative, slash-normalized paths; a prefix hit on a
//! directory prunes everything underneath it.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::Result;

/// Directories nobody wants change events from.
const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    ".bundle",
    "log",
    "tmp",
    "vendor",
    "target",
    "node_modules",
];

#[derive(Debug, Clone)]
pub struct IgnoreSet {
    prefixes: Vec<String>,
    glob_patterns: Vec<String>,
    glob_set: GlobSet,
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
            glob_patterns: Vec::new(),
            glob_set: GlobSet::empty(),
        }
    }
}

impl IgnoreSet {
    /// Default prefixes plus the given extra patterns.
    pub fn with_patterns(patterns: &[String]) -> Result<Self> {
        let mut set = Self::default();
        set.add_patterns(patterns)?;
        Ok(set)
    }

    /// Append patterns, effective on the next scan.
    ///
    /// Strings containing glob metacharacters are compiled as globs; plain
    /// strings are treated as path prefixes.
    pub fn add_patterns(&mut self, patterns: &[String]) -> Result<()> {
        let mut globs_dirty = false;
        for pat in patterns {
            if is_glob(pat) {
                self.glob_patterns.push(pat.clone());
                globs_dirty = true;
            } else {
                let trimmed = pat.trim_end_matches('/').to_string();
                if !self.prefixes.contains(&trimmed) {
                    self.prefixes.push(trimmed);
                }
            }
        }
        if globs_dirty {
            self.glob_set = build_globset(&self.glob_patterns)?;
        }
        Ok(())
    }

    /// True if the path (or a directory containing it) is excluded.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if self.prefixes.iter().any(|p| under_prefix(rel_path, p)) {
            return true;
        }
        self.glob_set.is_match(rel_path)
    }
}

fn under_prefix(rel_path: &str, prefix: &str) -> bool {
    rel_path
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    Ok(builder.build()?)
}

// src/watch/patterns.rs

//! Watch patterns and the file-matching core.
//!
//! Each guard owns an ordered list of [`WatchPattern`]s. A pattern is either
//! a literal relative path or a regular expression, optionally paired with a
//! transform that rewrites the matched path, drops it, or fans it out into
//! several paths. Matching is pure: the same pattern list and changed set
//! always produce the same output in the same order.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;

use crate::errors::Result;

/// Rewrites a successful match into the paths handed to the guard.
pub type Transform = Box<dyn Fn(&PatternMatch) -> TransformResult + Send + Sync>;

/// Outcome of a transform: drop the path, replace it, or fan it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    Skip,
    One(String),
    Many(Vec<String>),
}

/// A successful pattern match against one changed path.
///
/// Group 0 is always the full matched text; for literal patterns it is the
/// whole path and there are no further groups.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    groups: Vec<Option<String>>,
}

impl PatternMatch {
    /// The full matched text (capture group 0).
    pub fn path(&self) -> &str {
        self.groups.first().and_then(|g| g.as_deref()).unwrap_or("")
    }

    /// Capture group `idx`, if the group participated in the match.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.groups.get(idx).and_then(|g| g.as_deref())
    }
}

/// A single watch pattern: a literal relative path or a regex, plus an
/// optional transform.
pub struct WatchPattern {
    matcher: Matcher,
    transform: Option<Transform>,
}

enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl fmt::Debug for WatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("WatchPattern");
        match &self.matcher {
            Matcher::Literal(path) => dbg.field("literal", path),
            Matcher::Regex(re) => dbg.field("regex", &re.as_str()),
        };
        dbg.field("transform", &self.transform.is_some()).finish()
    }
}

impl WatchPattern {
    /// Pattern matching exactly one relative path.
    pub fn literal<P: Into<String>>(path: P) -> Self {
        Self {
            matcher: Matcher::Literal(path.into()),
            transform: None,
        }
    }

    /// Pattern matching any path the regex finds a match in (search
    /// semantics; anchor with `^`/`$` for whole-path matches).
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self {
            matcher: Matcher::Regex(Regex::new(pattern)?),
            transform: None,
        })
    }

    /// Attach a transform rewriting matched paths before dispatch.
    ///
    /// Transforms must be pure: they see only the match and produce paths.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&PatternMatch) -> TransformResult + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    fn try_match(&self, rel_path: &str) -> Option<PatternMatch> {
        match &self.matcher {
            Matcher::Literal(path) => (rel_path == path.as_str()).then(|| PatternMatch {
                groups: vec![Some(rel_path.to_string())],
            }),
            Matcher::Regex(re) => re.captures(rel_path).map(|caps| PatternMatch {
                groups: caps
                    .iter()
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect(),
            }),
        }
    }
}

/// True if any pattern matches any of the changed paths.
pub fn matches_any(patterns: &[WatchPattern], changed: &[String]) -> bool {
    patterns
        .iter()
        .any(|p| changed.iter().any(|path| p.try_match(path).is_some()))
}

/// Map changed paths through a guard's pattern list.
///
/// Patterns are tried in declaration order against every changed path. Each
/// match either passes the original path through (no transform) or
/// contributes whatever its transform returns. The output is deduplicated
/// keeping first occurrences, so order is deterministic.
pub fn match_files(patterns: &[WatchPattern], changed: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for pattern in patterns {
        for path in changed {
            let Some(matched) = pattern.try_match(path) else {
                continue;
            };
            match &pattern.transform {
                None => push_unique(&mut out, &mut seen, path.clone()),
                Some(transform) => match transform(&matched) {
                    TransformResult::Skip => {}
                    TransformResult::One(mapped) => push_unique(&mut out, &mut seen, mapped),
                    TransformResult::Many(mapped) => {
                        for p in mapped {
                            push_unique(&mut out, &mut seen, p);
                        }
                    }
                },
            }
        }
    }

    out
}

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, path: String) {
    if seen.insert(path.clone()) {
        out.push(path);
    }
}

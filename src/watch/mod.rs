// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Matching changed paths against per-guard watch patterns, including
//!   transforms.
//! - Detecting changes through a native (`notify`) or polling backend and
//!   delivering them as ordered batches.
//! - Scanning the tree for files modified since the last-event watermark,
//!   honoring ignore rules.
//!
//! It does **not** know about guards or dispatch; it only turns filesystem
//! activity into batches of relative paths.

pub mod backend;
pub mod ignores;
pub mod patterns;
pub mod polling;
pub mod scanner;

pub(crate) mod native;

pub use backend::{Backend, BackendKind, BackendOptions, ChangeBatch, select_backend, select_with};
pub use ignores::IgnoreSet;
pub use patterns::{PatternMatch, TransformResult, WatchPattern, match_files, matches_any};
pub use polling::nap_after;

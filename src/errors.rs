// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchguardError {
    #[error("No guards to run")]
    NoActiveGuards,

    #[error("Guard already registered: {0}")]
    DuplicateGuard(String),

    #[error("Unknown guard: {0} (no factory registered under that name)")]
    UnknownGuard(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Watch backend error: {0}")]
    BackendError(#[from] notify::Error),

    #[error("Invalid watch pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Invalid ignore pattern: {0}")]
    IgnoreError(#[from] globset::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchguardError>;

// src/guard/mod.rs

//! Guards: the pluggable task units dispatch targets.
//!
//! A guard implements the [`Guard`] trait; every lifecycle method defaults
//! to a succeeding no-op, so implementations override only what they need.
//! Guards are registered in a [`GuardRegistry`] together with their watch
//! patterns, lifecycle hooks, group, and options, and can be created by
//! name through a [`FactoryMap`].

pub mod factory;
pub mod registry;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;

pub use factory::FactoryMap;
pub use registry::{GuardEntry, GuardRegistry};

/// Lifecycle capability of a guard.
///
/// Methods return `Result`; any error is treated as a fault by the
/// supervising boundary and quarantines the guard for the rest of the run.
pub trait Guard: Send {
    /// Called once when watching starts.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the supervisor shuts down.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on a reload request.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run everything the guard covers, regardless of what changed.
    fn run_all(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run for the given changed paths (root-relative).
    fn run_on_change(&mut self, _paths: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard")
    }
}

/// Which lifecycle operation a supervised call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardOp {
    Start,
    Stop,
    Reload,
    RunAll,
    RunOnChange,
}

impl fmt::Display for GuardOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardOp::Start => "start",
            GuardOp::Stop => "stop",
            GuardOp::Reload => "reload",
            GuardOp::RunAll => "run_all",
            GuardOp::RunOnChange => "run_on_change",
        };
        write!(f, "{name}")
    }
}

/// Group tag plus the free-form option table attached at registration.
///
/// Unknown keys deserialize into `extra`, so a configuration layer can hand
/// a guard's whole TOML section through unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardOptions {
    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default, flatten)]
    pub extra: toml::Table,
}

fn default_group() -> String {
    "default".to_string()
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            group: default_group(),
            extra: toml::Table::new(),
        }
    }
}

impl GuardOptions {
    /// Options with a group tag and an empty table.
    pub fn in_group<G: Into<String>>(group: G) -> Self {
        Self {
            group: group.into(),
            extra: toml::Table::new(),
        }
    }
}

/// Phase of a supervised call a hook listens on.
///
/// `End` fires only when the call returned success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Begin,
    End,
}

/// A lifecycle hook event: operation plus phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookEvent {
    pub op: GuardOp,
    pub phase: HookPhase,
}

impl HookEvent {
    pub fn new(op: GuardOp, phase: HookPhase) -> Self {
        Self { op, phase }
    }
}

/// Listener attached to a guard entry, invoked on the selected hook events.
pub struct Callback {
    events: Vec<HookEvent>,
    listener: Box<dyn FnMut(HookEvent) + Send>,
}

impl Callback {
    pub fn new<F>(events: Vec<HookEvent>, listener: F) -> Self
    where
        F: FnMut(HookEvent) + Send + 'static,
    {
        Self {
            events,
            listener: Box::new(listener),
        }
    }

    pub(crate) fn fire(&mut self, event: HookEvent) {
        if self.events.contains(&event) {
            (self.listener)(event);
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// A guard lifecycle call that returned an error.
///
/// The boundary records one copy on the guard's registry entry and hands
/// one back to the caller; the error itself is shared.
#[derive(Debug, Clone)]
pub struct GuardFault {
    pub guard: String,
    pub op: GuardOp,
    pub error: Arc<anyhow::Error>,
}

impl fmt::Display for GuardFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guard {} failed during {}: {}", self.guard, self.op, self.error)
    }
}

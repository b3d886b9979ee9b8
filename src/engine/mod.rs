// src/engine/mod.rs

//! Orchestration engine for watchguard.
//!
//! This module ties together:
//! - the supervising event loop that reacts to:
//!   - change batches from the backend
//!   - control requests (stop, run-all, reload, ignore)
//! - the failure boundary that quarantines faulting guards so one bad
//!   guard never takes the loop down

pub(crate) mod boundary;
pub mod supervisor;

pub use supervisor::{Control, Supervisor, SupervisorHandle, SupervisorOptions, SupervisorState};

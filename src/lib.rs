// src/lib.rs

pub mod engine;
pub mod errors;
pub mod guard;
pub mod logging;
pub mod watch;

use tracing::info;

pub use crate::engine::{Control, Supervisor, SupervisorHandle, SupervisorOptions, SupervisorState};
pub use crate::errors::{Result, WatchguardError};
pub use crate::guard::{
    Callback, FactoryMap, Guard, GuardEntry, GuardFault, GuardOp, GuardOptions, GuardRegistry,
    HookEvent, HookPhase,
};
pub use crate::watch::{
    Backend, BackendKind, BackendOptions, ChangeBatch, IgnoreSet, PatternMatch, TransformResult,
    WatchPattern,
};

/// High-level entry point for embedders.
///
/// This wires together:
/// - Ctrl-C handling → an orderly stop request
/// - the supervisor's watch loop
pub async fn run(mut supervisor: Supervisor) -> Result<()> {
    // Ctrl-C → graceful shutdown.
    {
        let handle = supervisor.handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("interrupt received; requesting stop");
            handle.stop().await;
        });
    }

    supervisor.run().await
}

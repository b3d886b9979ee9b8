// src/engine/boundary.rs

//! The failure boundary around guard lifecycle calls.
//!
//! Every call into guard code goes through [`supervised`]: the begin hook
//! fires, the method runs, and an error return quarantines the guard in
//! the registry instead of propagating. The loop keeps running no matter
//! what an individual guard does.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error};

use crate::guard::{GuardFault, GuardOp, GuardRegistry, HookEvent, HookPhase};

/// Invoke `op` on the named guard inside the failure boundary.
///
/// `paths` is only read by `RunOnChange`. Calls on unknown or inactive
/// guards are skipped. On an error return the guard is deactivated, the
/// fault recorded on its entry, and a copy handed back so the caller can
/// report it; the caller never has to abort for it.
pub(crate) fn supervised(
    registry: &mut GuardRegistry,
    name: &str,
    op: GuardOp,
    paths: &[PathBuf],
) -> Result<(), GuardFault> {
    let result = {
        let Some(entry) = registry.entry_mut(name) else {
            debug!(guard = %name, op = %op, "supervised call on unknown guard; skipping");
            return Ok(());
        };
        if !entry.is_active() {
            debug!(guard = %name, op = %op, "supervised call on inactive guard; skipping");
            return Ok(());
        }

        entry.fire_hooks(HookEvent::new(op, HookPhase::Begin));

        let result = match op {
            GuardOp::Start => entry.guard_mut().start(),
            GuardOp::Stop => entry.guard_mut().stop(),
            GuardOp::Reload => entry.guard_mut().reload(),
            GuardOp::RunAll => entry.guard_mut().run_all(),
            GuardOp::RunOnChange => entry.guard_mut().run_on_change(paths),
        };

        if result.is_ok() {
            entry.fire_hooks(HookEvent::new(op, HookPhase::End));
        }
        result
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(
                guard = %name,
                op = %op,
                error = %err,
                "guard failed; removing it from the active set"
            );
            let fault = GuardFault {
                guard: name.to_string(),
                op,
                error: Arc::new(err),
            };
            registry.deactivate(name, fault.clone());
            Err(fault)
        }
    }
}

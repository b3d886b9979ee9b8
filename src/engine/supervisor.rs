// src/engine/supervisor.rs

//! The supervising dispatch loop.
//!
//! A [`Supervisor`] owns the guard registry and the change backend. Its
//! `run` loop starts every in-scope guard, then blocks on two channels:
//! control requests from [`SupervisorHandle`]s and change batches from the
//! backend. Each batch is matched against guard patterns and dispatched
//! sequentially through the failure boundary; afterwards one full re-scan
//! catches files the guards themselves modified, and those changes get one
//! extra dispatch pass before the loop goes back to waiting.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::boundary::supervised;
use crate::errors::{Result, WatchguardError};
use crate::guard::{GuardOp, GuardRegistry};
use crate::watch::backend::{Backend, ChangeBatch};

/// Where the supervisor currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Watching,
    Dispatching,
    Rescanning,
    Paused,
    Stopped,
}

/// Options for a supervised run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupervisorOptions {
    /// Clear the terminal when watching starts and around paused actions.
    #[serde(default)]
    pub clear: bool,

    /// Restrict the run to guards in these groups; empty means all groups.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Control requests sent into the loop from handles and signal listeners.
pub enum Control {
    Stop,
    RunAll,
    Reload,
    IgnorePaths(Vec<String>),
    /// Arbitrary registry action executed with the backend paused.
    Run(Box<dyn FnOnce(&mut GuardRegistry) + Send>),
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Stop => write!(f, "Stop"),
            Control::RunAll => write!(f, "RunAll"),
            Control::Reload => write!(f, "Reload"),
            Control::IgnorePaths(patterns) => {
                f.debug_tuple("IgnorePaths").field(patterns).finish()
            }
            Control::Run(_) => write!(f, "Run(..)"),
        }
    }
}

/// Cloneable handle for controlling a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    control_tx: mpsc::Sender<Control>,
}

impl SupervisorHandle {
    /// Request an orderly shutdown.
    pub async fn stop(&self) {
        let _ = self.control_tx.send(Control::Stop).await;
    }

    /// Run every active guard's `run_all` with watching paused.
    pub async fn run_all(&self) {
        let _ = self.control_tx.send(Control::RunAll).await;
    }

    /// Run every active guard's `reload` with watching paused.
    pub async fn reload(&self) {
        let _ = self.control_tx.send(Control::Reload).await;
    }

    /// Append ignore patterns, effective on the next scan.
    pub async fn ignore_paths(&self, patterns: Vec<String>) {
        let _ = self.control_tx.send(Control::IgnorePaths(patterns)).await;
    }

    /// Run `action` on the registry with watching paused.
    ///
    /// The loop stops the backend, runs the action, and resumes production
    /// on the same subscription.
    pub async fn run<F>(&self, action: F)
    where
        F: FnOnce(&mut GuardRegistry) + Send + 'static,
    {
        let _ = self.control_tx.send(Control::Run(Box::new(action))).await;
    }
}

/// The main orchestration loop over one registry and one backend.
pub struct Supervisor {
    registry: GuardRegistry,
    backend: Backend,
    options: SupervisorOptions,
    state: SupervisorState,
    control_tx: mpsc::Sender<Control>,
    control_rx: mpsc::Receiver<Control>,
    /// Non-stop controls that arrived mid-pass, run at the top of the loop.
    pending: VecDeque<Control>,
}

impl Supervisor {
    pub fn new(registry: GuardRegistry, backend: Backend, options: SupervisorOptions) -> Self {
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            registry,
            backend,
            options,
            state: SupervisorState::Idle,
            control_tx,
            control_rx,
            pending: VecDeque::new(),
        }
    }

    /// A handle for sending control requests into the loop.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            control_tx: self.control_tx.clone(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn registry(&self) -> &GuardRegistry {
        &self.registry
    }

    /// Start guards and the backend, then watch until a stop request.
    ///
    /// Fails up front with [`WatchguardError::NoActiveGuards`] when nothing
    /// is left to supervise after group scoping and guard start faults.
    /// After the loop returns the registry stays inspectable, quarantined
    /// entries and their faults included.
    pub async fn run(&mut self) -> Result<()> {
        self.state = SupervisorState::Starting;
        self.registry.scope_to_groups(&self.options.groups);

        let started = self.start_guards();
        if started == 0 {
            error!("no guards to run; check registrations and group scope");
            self.state = SupervisorState::Stopped;
            return Err(WatchguardError::NoActiveGuards);
        }

        if self.options.clear {
            clear_console();
        }

        let mut batch_rx = self.backend.subscribe();
        self.backend.update_last_event();
        self.backend.start()?;
        self.state = SupervisorState::Watching;
        info!(guards = started, backend = %self.backend.kind(), "watching started");

        loop {
            while let Some(control) = self.pending.pop_front() {
                match self.handle_control(control).await {
                    Ok(true) => {}
                    Ok(false) => return self.shut_down().await,
                    Err(err) => return self.fail_down(err).await,
                }
            }

            tokio::select! {
                biased;

                control = self.control_rx.recv() => {
                    // The supervisor holds a sender itself, so recv cannot
                    // return None while the loop is alive.
                    let Some(control) = control else {
                        return self.shut_down().await;
                    };
                    match self.handle_control(control).await {
                        Ok(true) => {}
                        Ok(false) => return self.shut_down().await,
                        Err(err) => return self.fail_down(err).await,
                    }
                }

                batch = batch_rx.recv() => {
                    match batch {
                        Some(batch) => {
                            if !self.handle_batch(batch).await {
                                return self.shut_down().await;
                            }
                        }
                        None => {
                            warn!("change backend channel closed; stopping");
                            return self.shut_down().await;
                        }
                    }
                }
            }
        }
    }

    /// Run `action` on the registry with the backend paused.
    ///
    /// Production stops, the console optionally clears, the action runs,
    /// production resumes on the same subscription.
    pub async fn run_paused<F>(&mut self, action: F) -> Result<()>
    where
        F: FnOnce(&mut GuardRegistry),
    {
        let prev = self.state;
        self.state = SupervisorState::Paused;
        let was_running = self.backend.is_running();
        self.backend.stop().await;
        if self.options.clear {
            clear_console();
        }

        action(&mut self.registry);

        self.state = prev;
        if was_running {
            self.backend.start()?;
        }
        Ok(())
    }

    /// Start every active guard through the boundary; a guard that fails
    /// its start is quarantined before watching begins. Returns how many
    /// are still active.
    fn start_guards(&mut self) -> usize {
        for name in self.registry.active_names() {
            let _ = supervised(&mut self.registry, &name, GuardOp::Start, &[]);
        }
        self.registry.active_names().len()
    }

    async fn handle_control(&mut self, control: Control) -> Result<bool> {
        debug!(?control, "supervisor received control");
        match control {
            Control::Stop => Ok(false),
            Control::RunAll => self.paused_op(GuardOp::RunAll).await,
            Control::Reload => self.paused_op(GuardOp::Reload).await,
            Control::IgnorePaths(patterns) => {
                if let Err(err) = self.backend.ignore_paths(&patterns) {
                    warn!(error = %err, "failed to add ignore patterns");
                }
                Ok(true)
            }
            Control::Run(action) => {
                self.run_paused(action).await?;
                Ok(true)
            }
        }
    }

    /// Dispatch one change batch, then re-scan once for files the guards
    /// themselves touched and give those a single extra dispatch pass.
    /// Returns false if a stop request interrupted the work.
    async fn handle_batch(&mut self, batch: ChangeBatch) -> bool {
        self.state = SupervisorState::Dispatching;
        debug!(count = batch.paths.len(), "dispatching change batch");

        if !self.dispatch_paths(&batch.paths) {
            return false;
        }

        self.state = SupervisorState::Rescanning;
        let extra = self.backend.modified_files(Vec::new(), true).await;
        self.backend.update_last_event();
        if !extra.is_empty() {
            debug!(count = extra.len(), "re-scan found changes made during dispatch");
            if !self.dispatch_paths(&extra) {
                return false;
            }
        }

        self.state = SupervisorState::Watching;
        true
    }

    /// Run `run_on_change` on every matching guard in registration order.
    /// Returns false if a stop request arrived between guard calls.
    fn dispatch_paths(&mut self, changed: &[String]) -> bool {
        for name in self.registry.matching_guards(changed) {
            if self.stop_requested() {
                info!("stop requested; aborting the rest of this dispatch pass");
                return false;
            }
            let Some(entry) = self.registry.entry(&name) else {
                continue;
            };
            let files = entry.match_files(changed);
            if files.is_empty() {
                continue;
            }
            let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
            debug!(guard = %name, files = ?files, "running guard for changed paths");
            let _ = supervised(&mut self.registry, &name, GuardOp::RunOnChange, &paths);
        }
        true
    }

    /// Run `op` on every active guard with the backend paused.
    async fn paused_op(&mut self, op: GuardOp) -> Result<bool> {
        info!(op = %op, "running guards with watching paused");
        let prev = self.state;
        self.state = SupervisorState::Paused;
        let was_running = self.backend.is_running();
        self.backend.stop().await;
        if self.options.clear {
            clear_console();
        }

        let mut keep = true;
        for name in self.registry.active_names() {
            if self.stop_requested() {
                info!("stop requested; aborting the rest of this pass");
                keep = false;
                break;
            }
            let _ = supervised(&mut self.registry, &name, op, &[]);
        }

        self.state = prev;
        if keep && was_running {
            self.backend.start()?;
        }
        Ok(keep)
    }

    /// Poll the control channel without blocking. Non-stop controls queue
    /// up for the top of the loop; a stop reports true immediately.
    fn stop_requested(&mut self) -> bool {
        while let Ok(control) = self.control_rx.try_recv() {
            if matches!(control, Control::Stop) {
                return true;
            }
            self.pending.push_back(control);
        }
        false
    }

    /// Shut down first, then surface the error that broke the loop, so
    /// started guards always receive their `stop()`.
    async fn fail_down(&mut self, err: WatchguardError) -> Result<()> {
        self.shut_down().await?;
        Err(err)
    }

    /// Orderly shutdown: stop the backend, then every active guard.
    async fn shut_down(&mut self) -> Result<()> {
        info!("supervisor stopping");
        self.backend.stop().await;
        for name in self.registry.active_names() {
            let _ = supervised(&mut self.registry, &name, GuardOp::Stop, &[]);
        }
        self.state = SupervisorState::Stopped;
        info!("supervisor stopped");
        Ok(())
    }
}

/// ANSI erase-display plus cursor-home on stdout; logs go to stderr.
fn clear_console() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x1b[2J\x1b[H");
    let _ = stdout.flush();
}

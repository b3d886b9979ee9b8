#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing_subscriber::{EnvFilter, fmt};
use watchguard::{Guard, GuardOp};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Shared journal of lifecycle calls, pushed as `"<guard>:<op>"` entries
/// (plus the joined path list for `run_on_change`).
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Poll `check` every 10ms until it reports true or `timeout` runs out.
pub async fn wait_for<F>(check: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn record_paths(journal: &Journal, name: &str, op: &str, paths: &[PathBuf]) {
    let joined = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(",");
    journal.lock().unwrap().push(format!("{name}:{op}:{joined}"));
}

/// Succeeds at everything, recording each call in the journal.
pub struct RecordingGuard {
    name: String,
    journal: Journal,
}

impl RecordingGuard {
    pub fn new(name: impl Into<String>, journal: Journal) -> Self {
        Self {
            name: name.into(),
            journal,
        }
    }

    fn record(&self, op: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{op}", self.name));
    }
}

impl Guard for RecordingGuard {
    fn start(&mut self) -> Result<()> {
        self.record("start");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record("stop");
        Ok(())
    }

    fn reload(&mut self) -> Result<()> {
        self.record("reload");
        Ok(())
    }

    fn run_all(&mut self) -> Result<()> {
        self.record("run_all");
        Ok(())
    }

    fn run_on_change(&mut self, paths: &[PathBuf]) -> Result<()> {
        record_paths(&self.journal, &self.name, "run_on_change", paths);
        Ok(())
    }
}

/// Records the call like [`RecordingGuard`], then fails the configured op.
pub struct FailingGuard {
    name: String,
    fail_on: GuardOp,
    journal: Journal,
}

impl FailingGuard {
    pub fn new(name: impl Into<String>, fail_on: GuardOp, journal: Journal) -> Self {
        Self {
            name: name.into(),
            fail_on,
            journal,
        }
    }

    fn call(&self, op: GuardOp, label: &str) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{label}", self.name));
        if op == self.fail_on {
            bail!("{} deliberately failing {label}", self.name);
        }
        Ok(())
    }
}

impl Guard for FailingGuard {
    fn start(&mut self) -> Result<()> {
        self.call(GuardOp::Start, "start")
    }

    fn stop(&mut self) -> Result<()> {
        self.call(GuardOp::Stop, "stop")
    }

    fn reload(&mut self) -> Result<()> {
        self.call(GuardOp::Reload, "reload")
    }

    fn run_all(&mut self) -> Result<()> {
        self.call(GuardOp::RunAll, "run_all")
    }

    fn run_on_change(&mut self, paths: &[PathBuf]) -> Result<()> {
        record_paths(&self.journal, &self.name, "run_on_change", paths);
        if self.fail_on == GuardOp::RunOnChange {
            bail!("{} deliberately failing run_on_change", self.name);
        }
        Ok(())
    }
}

/// Creates `target` on every `run_on_change`, simulating a guard whose run
/// itself modifies the watched tree.
pub struct TouchingGuard {
    name: String,
    target: PathBuf,
    journal: Journal,
}

impl TouchingGuard {
    pub fn new(name: impl Into<String>, target: PathBuf, journal: Journal) -> Self {
        Self {
            name: name.into(),
            target,
            journal,
        }
    }
}

impl Guard for TouchingGuard {
    fn run_on_change(&mut self, paths: &[PathBuf]) -> Result<()> {
        record_paths(&self.journal, &self.name, "run_on_change", paths);
        std::fs::write(&self.target, "induced during dispatch")?;
        Ok(())
    }
}

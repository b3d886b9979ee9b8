// src/watch/backend.rs

//! Change-detection backends and the state they share.
//!
//! A [`Backend`] produces [`ChangeBatch`]es over a bounded single-slot
//! channel: the producer task pushes one batch and waits until the consumer
//! has taken it before producing the next. Two variants exist, native OS
//! events via `notify` and a polling fallback that is always usable;
//! [`select_backend`] picks the first usable one in priority order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::anyhow;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::watch::ignores::IgnoreSet;
use crate::watch::scanner;
use crate::watch::{native, polling};

/// One detection cycle's worth of changes.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// Root-relative, slash-normalized, sorted, deduplicated.
    pub paths: Vec<String>,
    /// The watermark the batch was computed against.
    pub watermark: SystemTime,
}

/// Which change-detection strategy drives the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Polling,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Polling => write!(f, "polling"),
        }
    }
}

/// Tunables for the change-detection layer.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendOptions {
    /// Poll interval in seconds (polling backend only).
    #[serde(default = "default_latency")]
    pub latency: f64,

    /// Settle window in milliseconds used by the native backend to coalesce
    /// a burst of raw events into one batch.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Skip the native backend even where it is usable.
    #[serde(default)]
    pub force_polling: bool,
}

fn default_latency() -> f64 {
    1.0
}

fn default_settle_ms() -> u64 {
    250
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            latency: default_latency(),
            settle_ms: default_settle_ms(),
            force_polling: false,
        }
    }
}

/// State shared between the producer task and on-demand scans: the watched
/// root, the last-event watermark, and the ignore rules.
#[derive(Debug)]
pub(crate) struct WatchState {
    root: PathBuf,
    last_event: Mutex<SystemTime>,
    ignores: Mutex<IgnoreSet>,
}

impl WatchState {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            last_event: Mutex::new(SystemTime::now()),
            ignores: Mutex::new(IgnoreSet::default()),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn watermark(&self) -> SystemTime {
        match self.last_event.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("last-event mutex poisoned; recovering stored value");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn set_watermark(&self, to: SystemTime) {
        match self.last_event.lock() {
            Ok(mut guard) => *guard = to,
            Err(poisoned) => {
                warn!("last-event mutex poisoned; recovering stored value");
                *poisoned.into_inner() = to;
            }
        }
    }

    pub(crate) fn ignores_snapshot(&self) -> IgnoreSet {
        match self.ignores.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn!("ignore-set mutex poisoned; recovering stored value");
                poisoned.into_inner().clone()
            }
        }
    }

    fn add_ignore_patterns(&self, patterns: &[String]) -> Result<()> {
        match self.ignores.lock() {
            Ok(mut guard) => guard.add_patterns(patterns),
            Err(poisoned) => {
                warn!("ignore-set mutex poisoned; recovering stored value");
                poisoned.into_inner().add_patterns(patterns)
            }
        }
    }
}

/// Scan for files modified at or after `watermark`.
///
/// `all` forces a full recursive scan of the root; otherwise only the
/// immediate children of `dirs` are examined.
pub(crate) fn scan_with(
    state: &WatchState,
    dirs: &[PathBuf],
    all: bool,
    watermark: SystemTime,
) -> Vec<String> {
    let ignores = state.ignores_snapshot();
    if all {
        scanner::scan_tree(state.root(), watermark, &ignores)
    } else {
        scanner::scan_dirs(state.root(), dirs, watermark, &ignores)
    }
}

/// Walk candidate kinds in priority order, returning the first one whose
/// usability probe succeeds.
pub fn select_with<F>(candidates: &[BackendKind], probe: F) -> Option<BackendKind>
where
    F: Fn(BackendKind) -> bool,
{
    candidates.iter().copied().find(|kind| probe(*kind))
}

/// Pick the backend for `root`: native OS events where available, else
/// polling. Polling always probes usable, so this cannot fail.
pub fn select_backend(root: &Path, options: &BackendOptions) -> BackendKind {
    let candidates: &[BackendKind] = if options.force_polling {
        &[BackendKind::Polling]
    } else {
        &[BackendKind::Native, BackendKind::Polling]
    };

    let selected = select_with(candidates, |kind| match kind {
        BackendKind::Native => match native::probe(root) {
            Ok(()) => true,
            Err(err) => {
                info!("native watch backend unavailable ({err}); falling back to polling");
                false
            }
        },
        BackendKind::Polling => true,
    })
    .unwrap_or(BackendKind::Polling);

    info!(backend = %selected, "selected change backend");
    selected
}

/// A running (or stopped) change-detection backend for one root directory.
///
/// `subscribe` must be called before `start`; `stop` followed by another
/// `start` resumes production on the same subscription, keeping the
/// watermark and ignore rules.
#[derive(Debug)]
pub struct Backend {
    kind: BackendKind,
    state: Arc<WatchState>,
    options: BackendOptions,
    batch_tx: Option<mpsc::Sender<ChangeBatch>>,
    stop_tx: Option<watch::Sender<bool>>,
    producer: Option<JoinHandle<()>>,
}

impl Backend {
    /// Select and construct the backend for `root`.
    pub fn new(root: impl Into<PathBuf>, options: BackendOptions) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or_else(|_| root.clone()); // best-effort
        let kind = select_backend(&root, &options);
        Self::with_kind(root, kind, options)
    }

    /// Construct a backend of a specific kind, skipping selection.
    pub fn with_kind(root: impl Into<PathBuf>, kind: BackendKind, options: BackendOptions) -> Self {
        Self {
            kind,
            state: Arc::new(WatchState::new(root.into())),
            options,
            batch_tx: None,
            stop_tx: None,
            producer: None,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        self.state.root()
    }

    /// True between a successful `start()` and the next `stop()`.
    pub fn is_running(&self) -> bool {
        self.producer.is_some()
    }

    /// Register the batch-delivery channel.
    ///
    /// At most one subscription is live at a time; subscribing again
    /// replaces the previous one, whose receiver then reports closed. A
    /// running producer keeps the sender it was started with, so
    /// re-subscribe while stopped; the replacement takes effect on the
    /// next `start()`.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChangeBatch> {
        let (tx, rx) = mpsc::channel(1);
        self.batch_tx = Some(tx);
        rx
    }

    /// Begin producing change batches.
    pub fn start(&mut self) -> Result<()> {
        let Some(batch_tx) = self.batch_tx.clone() else {
            return Err(anyhow!("subscribe() must be called before start()").into());
        };
        if self.producer.is_some() {
            debug!("backend already started; ignoring start()");
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::clone(&self.state);
        let producer = match self.kind {
            BackendKind::Native => native::spawn(state, self.options.clone(), batch_tx, stop_rx)?,
            BackendKind::Polling => polling::spawn(state, self.options.clone(), batch_tx, stop_rx),
        };

        self.stop_tx = Some(stop_tx);
        self.producer = Some(producer);
        info!(backend = %self.kind, root = ?self.state.root(), "change backend started");
        Ok(())
    }

    /// Stop producing and release native resources.
    ///
    /// Waits for the producer task to wind down so no stale batch can be
    /// delivered after this returns.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(producer) = self.producer.take() {
            if producer.await.is_err() {
                warn!("backend producer task panicked during stop");
            }
        }
        debug!(backend = %self.kind, "change backend stopped");
    }

    /// On-demand scan for files modified at or after the watermark.
    ///
    /// With `all` the whole root is scanned recursively regardless of
    /// `dirs`; otherwise only the immediate children of `dirs` are checked.
    pub async fn modified_files(&self, dirs: Vec<PathBuf>, all: bool) -> Vec<String> {
        let state = Arc::clone(&self.state);
        let watermark = state.watermark();
        tokio::task::spawn_blocking(move || scan_with(&state, &dirs, all, watermark))
            .await
            .unwrap_or_default() // if the blocking scan panics, report nothing
    }

    /// Advance the watermark to now.
    pub fn update_last_event(&self) {
        self.state.set_watermark(SystemTime::now());
    }

    /// Append ignore patterns, effective on the next scan.
    pub fn ignore_paths(&self, patterns: &[String]) -> Result<()> {
        self.state.add_ignore_patterns(patterns)
    }
}

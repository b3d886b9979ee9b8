// src/watch/native.rs

//! Native change detection via OS file-system notifications.
//!
//! notify's callback runs on its own thread; events funnel through an
//! unbounded channel into an async collector task. The collector waits one
//! settle window after the first event of a burst, reduces the burst to the
//! set of directories that changed, expands those through the scanner, and
//! hands the resulting batch to the single-slot channel.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::Result;
use crate::watch::backend::{BackendOptions, ChangeBatch, WatchState, scan_with};

/// Usability probe: construct a watcher on `root` and drop it.
///
/// Construction and the initial watch are where the OS facility fails
/// (unsupported platform, inotify instance or watch limits).
pub(crate) fn probe(root: &Path) -> notify::Result<()> {
    let mut watcher =
        RecommendedWatcher::new(|_res: notify::Result<Event>| {}, Config::default())?;
    watcher.watch(root, RecursiveMode::NonRecursive)?;
    Ok(())
}

/// Spawn the watcher and its collector task.
///
/// The collector owns the `RecommendedWatcher`; when it exits (stop signal,
/// closed channel) the watcher drops and the OS watch is released.
pub(crate) fn spawn(
    state: Arc<WatchState>,
    options: BackendOptions,
    batch_tx: mpsc::Sender<ChangeBatch>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    // Closure called synchronously by notify whenever an event arrives.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // We can't log via tracing here easily, so fallback to stderr.
                    eprintln!("watchguard: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("watchguard: file watch error: {err}");
            }
        },
        Config::default(),
    )?;
    watcher.watch(state.root(), RecursiveMode::Recursive)?;

    info!("native file watcher started on {:?}", state.root());

    let settle = Duration::from_millis(options.settle_ms);
    let handle = tokio::spawn(async move {
        let _watcher = watcher;

        'collect: loop {
            // Wait for the first event of a burst, or for stop.
            let first = tokio::select! {
                _ = stop_rx.changed() => break 'collect,
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => break 'collect,
                },
            };
            debug!(?first, "native event burst started");

            let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
            collect_dirs(&mut dirs, &first);

            // Drain the rest of the burst until the settle window closes.
            let deadline = tokio::time::Instant::now() + settle;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break 'collect,
                    _ = tokio::time::sleep_until(deadline) => break,
                    event = event_rx.recv() => match event {
                        Some(event) => collect_dirs(&mut dirs, &event),
                        None => break,
                    },
                }
            }

            let watermark = state.watermark();
            let dirs: Vec<PathBuf> = dirs.into_iter().collect();
            let scan_state = Arc::clone(&state);
            let paths =
                tokio::task::spawn_blocking(move || scan_with(&scan_state, &dirs, false, watermark))
                    .await
                    .unwrap_or_default();

            if paths.is_empty() {
                continue;
            }

            state.set_watermark(SystemTime::now());
            debug!(count = paths.len(), "native backend delivering batch");
            let batch = ChangeBatch { paths, watermark };
            tokio::select! {
                _ = stop_rx.changed() => break 'collect,
                sent = batch_tx.send(batch) => {
                    if sent.is_err() {
                        break 'collect;
                    }
                }
            }
        }

        debug!("native collector loop ended");
    });

    Ok(handle)
}

/// Reduce an event to the directories it touched: a changed file counts as
/// a change of its parent directory.
fn collect_dirs(dirs: &mut BTreeSet<PathBuf>, event: &Event) {
    for path in &event.paths {
        if path.is_dir() {
            dirs.insert(path.clone());
        } else if let Some(parent) = path.parent() {
            dirs.insert(parent.to_path_buf());
        }
    }
}

// src/watch/polling.rs

//! Polling change detection, the always-available fallback.
//!
//! The loop scans the whole tree against the watermark, delivers a batch
//! when the scan found anything, then naps long enough that consecutive
//! scans start one latency interval apart. A long scan eats into the nap,
//! floored at zero.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::watch::backend::{BackendOptions, ChangeBatch, WatchState, scan_with};

/// Spawn the polling loop.
pub(crate) fn spawn(
    state: Arc<WatchState>,
    options: BackendOptions,
    batch_tx: mpsc::Sender<ChangeBatch>,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let latency = Duration::from_secs_f64(options.latency.max(0.0));

    tokio::spawn(async move {
        info!(
            "polling watcher started on {:?} (latency {:?})",
            state.root(),
            latency
        );

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let started = Instant::now();
            let watermark = state.watermark();
            let scan_state = Arc::clone(&state);
            let paths =
                tokio::task::spawn_blocking(move || scan_with(&scan_state, &[], true, watermark))
                    .await
                    .unwrap_or_default();

            if !paths.is_empty() {
                state.set_watermark(SystemTime::now());
                debug!(count = paths.len(), "polling backend delivering batch");
                let batch = ChangeBatch { paths, watermark };
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    sent = batch_tx.send(batch) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }

            let nap = nap_after(latency, started.elapsed());
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(nap) => {}
            }
        }

        debug!("polling loop ended");
    })
}

/// Time to nap so consecutive scans start `latency` apart: the elapsed scan
/// time is deducted, floored at zero when the scan ran long.
pub fn nap_after(latency: Duration, elapsed: Duration) -> Duration {
    latency.saturating_sub(elapsed)
}

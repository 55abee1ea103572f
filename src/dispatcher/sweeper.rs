//! Obsolete cache sweeper.
//!
//! Runs on a fixed period independent of any refresh interval. Each pass keeps
//! the `retention` newest files per key, TTL notwithstanding, and deletes the
//! rest. Temp files never decode as cache files and are not touched.

use std::io::ErrorKind;
use std::sync::{Arc, Weak};

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::DispatcherInner;
use crate::MimirError;
use crate::telemetry::{SWEEP_FAILURES_TOTAL, SWEEP_REMOVED_TOTAL};
use crate::types::SweepReport;

impl DispatcherInner {
    /// One sweep over every configured key.
    pub(super) async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for key in self.sorted_keys() {
            let Some(config) = self.models.get(&key) else {
                continue;
            };
            let retention = config.retention.unwrap_or(self.retention);

            let files = match self.catalog.entry(config).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(key = %key, error = %e, "sweep scan failed");
                    report.failed.push((config.cache_dir.clone(), e.to_string()));
                    continue;
                }
            };

            for obsolete in files.into_iter().skip(retention) {
                match tokio::fs::remove_file(&obsolete.path).await {
                    Ok(()) => {
                        debug!(key = %key, path = %obsolete.path.display(), "removed obsolete cache file");
                        counter!(SWEEP_REMOVED_TOTAL, "key" => key.clone()).increment(1);
                        report.removed.push(obsolete.path);
                    }
                    // Already gone; nothing to report.
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        let err = MimirError::Sweep {
                            path: obsolete.path.clone(),
                            message: e.to_string(),
                        };
                        warn!(key = %key, error = %err, "failed to remove obsolete cache file");
                        counter!(SWEEP_FAILURES_TOTAL, "key" => key.clone()).increment(1);
                        report.failed.push((obsolete.path, e.to_string()));
                    }
                }
            }
        }

        if !report.removed.is_empty() || !report.is_clean() {
            info!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "cache sweep finished"
            );
        }
        report
    }
}

/// Spawn the periodic sweep loop. The first pass runs one period after start.
pub(super) fn spawn_sweeper(inner: &Arc<DispatcherInner>) -> JoinHandle<()> {
    let period = inner.sweep_interval;
    let weak: Weak<DispatcherInner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        let Some(first) = Instant::now().checked_add(period) else {
            warn!(period = ?period, "sweep interval out of range, periodic sweep disabled");
            return;
        };
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.sweep().await;
        }
    })
}

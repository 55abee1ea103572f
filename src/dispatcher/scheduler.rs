//! Background refresh timers.
//!
//! The scheduler owns at most one one-shot timer per key. Arming a key that
//! already has a timer aborts the old one first, so re-arming is idempotent
//! no matter how many completions race to do it. What a timer *does* when it
//! fires is supplied by the caller; the dispatcher uses it to start a
//! background cycle on a separate task.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::lock::lock;
use crate::clock::Clock;

/// One armed timer.
#[derive(Debug)]
pub struct ScheduledRefresh {
    pub key: String,
    handle: JoinHandle<()>,
    /// Period the key is re-armed with after each cycle.
    pub interval: Duration,
    /// Clock time the timer fires at.
    pub due_at_ms: u64,
}

impl ScheduledRefresh {
    /// The timer has not fired and was not aborted.
    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Per-key cancellable refresh timers plus background-cycle flags.
pub struct RefreshScheduler {
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<String, ScheduledRefresh>>,
    running: Mutex<HashSet<String>>,
}

impl RefreshScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Mutex::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Arm `key` to run `fire` after `delay`, replacing any existing timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, key: &str, delay: Duration, interval: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut timers = lock(&self.timers, "scheduler.arm");
        if let Some(previous) = timers.remove(key) {
            previous.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });
        let due_at_ms = self
            .clock
            .now_ms()
            .saturating_add(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));

        debug!(key = %key, delay_ms = delay.as_millis() as u64, due_at_ms, "refresh armed");
        timers.insert(
            key.to_string(),
            ScheduledRefresh {
                key: key.to_string(),
                handle,
                interval,
                due_at_ms,
            },
        );
    }

    /// Abort the timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.timers, "scheduler.cancel").remove(key) {
            Some(timer) => {
                let pending = timer.is_pending();
                timer.handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers, "scheduler.cancel_all").drain() {
            timer.handle.abort();
        }
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        lock(&self.timers, "scheduler.is_scheduled")
            .get(key)
            .is_some_and(ScheduledRefresh::is_pending)
    }

    /// Number of timers that have not fired yet.
    pub fn scheduled_count(&self) -> usize {
        lock(&self.timers, "scheduler.scheduled_count")
            .values()
            .filter(|t| t.is_pending())
            .count()
    }

    pub fn next_due_ms(&self, key: &str) -> Option<u64> {
        lock(&self.timers, "scheduler.next_due_ms")
            .get(key)
            .filter(|t| t.is_pending())
            .map(|t| t.due_at_ms)
    }

    pub fn set_background_running(&self, key: &str, running: bool) {
        let mut set = lock(&self.running, "scheduler.set_background_running");
        if running {
            set.insert(key.to_string());
        } else {
            set.remove(key);
        }
    }

    pub fn is_background_running(&self, key: &str) -> bool {
        lock(&self.running, "scheduler.is_background_running").contains(key)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler() -> RefreshScheduler {
        RefreshScheduler::new(Arc::new(ManualClock::new(1_000)))
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let second = Duration::from_secs(1);

        scheduler.arm("sales", second, second, counting(&fired));
        assert!(scheduler.is_scheduled("sales"));
        assert_eq!(scheduler.next_due_ms("sales"), Some(2_000));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("sales"));
        assert_eq!(scheduler.next_due_ms("sales"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_timer() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let second = Duration::from_secs(1);

        for _ in 0..5 {
            scheduler.arm("sales", second, second, counting(&fired));
        }
        assert_eq!(scheduler.scheduled_count(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let second = Duration::from_secs(1);

        scheduler.arm("sales", second, second, counting(&fired));
        scheduler.arm("orders", second, second, counting(&fired));
        assert!(scheduler.cancel("sales"));
        assert!(!scheduler.cancel("sales"));
        assert_eq!(scheduler.scheduled_count(), 1);

        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.scheduled_count(), 0);
    }

    #[test]
    fn background_running_flag() {
        let scheduler = scheduler();
        assert!(!scheduler.is_background_running("sales"));
        scheduler.set_background_running("sales", true);
        assert!(scheduler.is_background_running("sales"));
        scheduler.set_background_running("sales", false);
        assert!(!scheduler.is_background_running("sales"));
    }
}

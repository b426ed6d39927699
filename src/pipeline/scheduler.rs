//! Periodic scan trigger
//!
//! Fires on a fixed interval and starts a cycle only when none is running.
//! Triggers that land on a busy scanner are dropped, never queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Marks the scanner busy until dropped
pub struct CycleGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Drop-if-busy periodic trigger
pub struct ScanScheduler {
    period: Duration,
    busy: Arc<AtomicBool>,
    started: AtomicU64,
    skipped: AtomicU64,
    cancel: CancellationToken,
}

impl ScanScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            busy: Arc::new(AtomicBool::new(false)),
            started: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn cycles_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn cycles_skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Claim the single cycle slot, or `None` when a cycle is running
    pub fn try_begin(&self) -> Option<CycleGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Fire `cycle` every period until cancelled.
    ///
    /// Each cycle runs as its own task; a tick that finds the previous one
    /// still running is skipped. On cancellation the in-flight cycle is
    /// awaited before returning.
    pub async fn run<F, Fut>(&self, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        info!("Scan trigger every {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(guard) = self.try_begin() else {
                let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Cycle still running, skipping trigger ({} skipped)", skipped);
                continue;
            };

            self.started.fetch_add(1, Ordering::Relaxed);
            let fut = cycle();
            in_flight = Some(tokio::spawn(async move {
                let _guard = guard;
                fut.await;
            }));
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!("Scan cycle task failed: {}", e);
            }
        }

        info!(
            "Scan trigger stopped: {} cycles, {} skipped triggers",
            self.cycles_started(),
            self.cycles_skipped()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_single_slot() {
        let scheduler = ScanScheduler::new(Duration::from_millis(10));

        let guard = scheduler.try_begin().unwrap();
        assert!(scheduler.is_busy());
        assert!(scheduler.try_begin().is_none());

        drop(guard);
        assert!(!scheduler.is_busy());
        assert!(scheduler.try_begin().is_some());
    }

    #[tokio::test]
    async fn test_slow_cycles_never_overlap() {
        let scheduler = Arc::new(ScanScheduler::new(Duration::from_millis(5)));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let cancel = scheduler.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });

        scheduler
            .run(|| {
                let running = Arc::clone(&running);
                let max_running = Arc::clone(&max_running);
                let completed = Arc::clone(&completed);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert!(scheduler.cycles_skipped() > 0);
        assert!(scheduler.cycles_started() >= 1);
        // the last cycle was awaited on shutdown
        assert_eq!(completed.load(Ordering::SeqCst) as u64, scheduler.cycles_started());
        assert!(!scheduler.is_busy());
    }

    #[tokio::test]
    async fn test_panicking_cycle_releases_slot() {
        let scheduler = Arc::new(ScanScheduler::new(Duration::from_millis(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        let cancel = scheduler.cancellation_token();
        let counter = Arc::clone(&calls);
        tokio::spawn(async move {
            while counter.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        });

        scheduler
            .run(|| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first cycle fails");
                    }
                }
            })
            .await;

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}

//! Periodic sync scheduler.
//!
//! Runs a [`SyncJob`] on a fixed interval in one background tokio task.
//!
//! ```text
//!   Stopped ──start()──▶ Running ──stop()──▶ Stopped
//!      ▲                   │
//!      └── task exits ─────┘  (restartable)
//! ```
//!
//! A pass is never interrupted: shutdown is observed between passes, where
//! the loop waits on `select!` of the interval sleep and a `watch` shutdown
//! signal. [`Scheduler::stop`] waits at most `stop_timeout` for the loop to
//! exit and reports [`StopOutcome::TimedOut`] if a pass is still running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use issue_harness_core::error::Result;
use issue_harness_core::models::SyncReport;

use crate::reconcile::Reconciler;

/// One unit of periodic work.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run_pass(&self) -> Result<SyncReport>;
}

#[async_trait]
impl SyncJob for Reconciler {
    async fn run_pass(&self) -> Result<SyncReport> {
        self.run().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop exited within the timeout.
    Stopped,
    /// No loop was running.
    NotRunning,
    /// The loop did not exit in time; it was signalled but not killed.
    TimedOut,
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

enum State {
    Idle,
    Running(Running),
    /// `stop()` owns the task and is waiting for it outside the lock.
    Stopping,
}

impl State {
    fn is_live(&self) -> bool {
        match self {
            State::Idle => false,
            State::Running(r) => !r.handle.is_finished(),
            State::Stopping => true,
        }
    }
}

pub struct Scheduler {
    job: Arc<dyn SyncJob>,
    interval: Duration,
    stop_timeout: Duration,
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(job: Arc<dyn SyncJob>, interval: Duration, stop_timeout: Duration) -> Self {
        Self {
            job,
            interval,
            stop_timeout,
            state: Mutex::new(State::Idle),
        }
    }

    /// Spawn the loop. Returns `false` without spawning if a loop is alive
    /// or still being stopped.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.is_live() {
            tracing::debug!("scheduler already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sync_loop(self.job.clone(), self.interval, shutdown_rx));
        *state = State::Running(Running {
            shutdown_tx,
            handle,
        });

        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler started");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_live()
    }

    /// Signal the loop to exit and wait up to the stop timeout.
    ///
    /// The lock is released while waiting; concurrent `start()` calls are
    /// refused until the outcome is known.
    pub async fn stop(&self) -> StopOutcome {
        let mut current = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, State::Stopping) {
                State::Running(r) if !r.handle.is_finished() => r,
                State::Stopping => return StopOutcome::NotRunning,
                State::Idle | State::Running(_) => {
                    *state = State::Idle;
                    return StopOutcome::NotRunning;
                }
            }
        };

        let _ = current.shutdown_tx.send(true);
        let joined = tokio::time::timeout(self.stop_timeout, &mut current.handle).await;

        let mut state = self.state.lock().await;
        match joined {
            Ok(result) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "scheduler task ended abnormally");
                }
                *state = State::Idle;
                tracing::info!("scheduler stopped");
                StopOutcome::Stopped
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.stop_timeout.as_secs(),
                    "scheduler did not stop in time; pass still running"
                );
                *state = State::Running(current);
                StopOutcome::TimedOut
            }
        }
    }
}

async fn sync_loop(job: Arc<dyn SyncJob>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match job.run_pass().await {
            Ok(report) => tracing::info!(
                updated = report.updated_keys.len(),
                skipped = report.skipped(),
                failed = report.failed_keys.len(),
                "scheduled sync complete"
            ),
            Err(e) => tracing::error!(code = e.code(), error = %e, "scheduled sync failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use issue_harness_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        passes: AtomicUsize,
        pass_time: Duration,
        fail: bool,
    }

    impl Counting {
        fn new(pass_time: Duration) -> Arc<Self> {
            Arc::new(Self {
                passes: AtomicUsize::new(0),
                pass_time,
                fail: false,
            })
        }
    }

    #[async_trait]
    impl SyncJob for Counting {
        async fn run_pass(&self) -> Result<SyncReport> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.pass_time).await;
            if self.fail {
                return Err(Error::Fetch(anyhow::anyhow!("tracker down")));
            }
            Ok(SyncReport::default())
        }
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_stops() {
        let job = Counting::new(Duration::ZERO);
        let s = Scheduler::new(job.clone(), Duration::from_secs(3600), Duration::from_secs(5));
        assert!(s.start().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(job.passes.load(Ordering::SeqCst), 1);
        assert_eq!(s.stop().await, StopOutcome::Stopped);
        assert!(!s.is_running().await);
    }

    #[tokio::test]
    async fn test_double_start_runs_single_loop() {
        let job = Counting::new(Duration::ZERO);
        let s = Scheduler::new(job.clone(), Duration::from_secs(3600), Duration::from_secs(5));
        assert!(s.start().await);
        assert!(!s.start().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(job.passes.load(Ordering::SeqCst), 1);
        s.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let s = Scheduler::new(
            Counting::new(Duration::ZERO),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(s.stop().await, StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let job = Counting::new(Duration::ZERO);
        let s = Scheduler::new(job.clone(), Duration::from_secs(3600), Duration::from_secs(5));
        assert!(s.start().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(s.stop().await, StopOutcome::Stopped);
        assert!(s.start().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(job.passes.load(Ordering::SeqCst), 2);
        s.stop().await;
    }

    #[tokio::test]
    async fn test_interval_repeats_passes() {
        let job = Counting::new(Duration::ZERO);
        let s = Scheduler::new(job.clone(), Duration::from_millis(20), Duration::from_secs(5));
        s.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        s.stop().await;
        assert!(job.passes.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_failing_pass_does_not_kill_loop() {
        let job = Arc::new(Counting {
            passes: AtomicUsize::new(0),
            pass_time: Duration::ZERO,
            fail: true,
        });
        let s = Scheduler::new(job.clone(), Duration::from_millis(10), Duration::from_secs(5));
        s.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(s.is_running().await);
        assert!(job.passes.load(Ordering::SeqCst) >= 2);
        assert_eq!(s.stop().await, StopOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_stop_times_out_during_long_pass() {
        let job = Counting::new(Duration::from_millis(500));
        let s = Scheduler::new(job.clone(), Duration::from_secs(3600), Duration::from_millis(20));
        s.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(s.stop().await, StopOutcome::TimedOut);
        // Still alive, so a second start is refused
        assert!(!s.start().await);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(s.stop().await, StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_does_not_block_other_callers() {
        let job = Counting::new(Duration::from_millis(300));
        let s = Arc::new(Scheduler::new(
            job.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        ));
        s.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stopping = {
            let s = s.clone();
            tokio::spawn(async move { s.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let quick = Duration::from_millis(100);
        assert_eq!(tokio::time::timeout(quick, s.is_running()).await, Ok(true));
        assert_eq!(tokio::time::timeout(quick, s.start()).await, Ok(false));

        assert_eq!(stopping.await.unwrap(), StopOutcome::Stopped);
        assert!(!s.is_running().await);
        assert_eq!(job.passes.load(Ordering::SeqCst), 1);
    }
}

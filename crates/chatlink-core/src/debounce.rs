//! Debounced background jobs
//!
//! A [`DebounceJob`] coalesces any number of [`DebounceJob::notice`] calls
//! into at most one run of its action per interval. A timer ticks every
//! interval (first tick one full interval after spawning) and runs the action
//! only if the dirty flag was set since the last run. An idle job does no work
//! and logs nothing.
//!
//! The action runs on the timer task itself, so two runs never overlap. A
//! notice that arrives while the action is running is picked up on the next
//! tick. If the action fails, the job marks itself dirty again so the failed
//! work is retried one window later.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Debounce Job
// ----------------------------------------------------------------------------

/// Periodic job that runs its action only when noticed
#[derive(Debug)]
pub struct DebounceJob {
    name: &'static str,
    interval: Duration,
    dirty: Arc<AtomicBool>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DebounceJob {
    /// Spawn the job's timer on the current tokio runtime
    ///
    /// The timer stops when `parent` is cancelled, when [`cancel`] is called,
    /// or when the job is dropped.
    ///
    /// [`cancel`]: DebounceJob::cancel
    pub fn spawn<F, Fut, E>(
        name: &'static str,
        interval: Duration,
        parent: &CancellationToken,
        mut action: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let dirty = Arc::new(AtomicBool::new(false));
        let cancel = parent.child_token();

        let task_dirty = dirty.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if !task_dirty.swap(false, Ordering::AcqRel) {
                            continue;
                        }
                        if let Err(e) = action().await {
                            warn!("Debounced job {} failed, retrying next window: {}", name, e);
                            task_dirty.store(true, Ordering::Release);
                        }
                    }
                }
            }

            debug!("Debounced job {} stopped", name);
        });

        Self {
            name,
            interval,
            dirty,
            cancel,
            handle,
        }
    }

    /// Mark the job dirty; repeated calls before the next run have no
    /// additional effect
    pub fn notice(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether a run is pending
    pub fn is_pending(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the dirty flag, returning whether it was set
    ///
    /// Used by explicit flushes that do the job's work themselves.
    pub fn take_pending(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Stop the timer and suppress any further runs
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the timer task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DebounceJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn counting_job(
        interval: Duration,
        parent: &CancellationToken,
    ) -> (DebounceJob, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let job_runs = runs.clone();
        let job = DebounceJob::spawn("counting", interval, parent, move || {
            let runs = job_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Infallible>(())
            }
        });
        (job, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_noticed_never_runs() {
        let parent = CancellationToken::new();
        let (_job, runs) = counting_job(Duration::from_millis(100), &parent);

        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_notices_runs_once_after_interval() {
        let parent = CancellationToken::new();
        let (job, runs) = counting_job(Duration::from_millis(100), &parent);

        for _ in 0..5 {
            job.notice();
            sleep(Duration::from_millis(2)).await;
        }

        sleep(Duration::from_millis(89)).await; // t = 99
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(2)).await; // t = 101
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!job.is_pending());

        // Nothing new was noticed, so later windows stay idle
        sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_in_later_window_runs_again() {
        let parent = CancellationToken::new();
        let (job, runs) = counting_job(Duration::from_millis(100), &parent);

        job.notice();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        job.notice();
        job.notice();
        sleep(Duration::from_millis(100)).await; // t = 250
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_pending_run() {
        let parent = CancellationToken::new();
        let (job, runs) = counting_job(Duration::from_millis(100), &parent);

        job.notice();
        job.cancel();
        sleep(Duration::from_millis(300)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(job.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_cascades() {
        let parent = CancellationToken::new();
        let (job, runs) = counting_job(Duration::from_millis(100), &parent);

        job.notice();
        parent.cancel();
        sleep(Duration::from_millis(300)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(job.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_retried_next_window() {
        let parent = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let job_attempts = attempts.clone();
        let job = DebounceJob::spawn("flaky", Duration::from_millis(100), &parent, move || {
            let attempts = job_attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("disk full")
                } else {
                    Ok(())
                }
            }
        });

        job.notice();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(job.is_pending());

        sleep(Duration::from_millis(100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!job.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_pending_clears_flag() {
        let parent = CancellationToken::new();
        let (job, runs) = counting_job(Duration::from_millis(100), &parent);

        job.notice();
        assert!(job.take_pending());
        assert!(!job.take_pending());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}

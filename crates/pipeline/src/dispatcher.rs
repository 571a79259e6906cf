//! Shared job queue with wake-ups for the orchestrator.
//!
//! Wraps [`JobQueue`] in one async mutex. The lock is only ever held for
//! the duration of a queue operation, never across I/O. Callers must not
//! hold a sample lock while calling into the dispatcher.
//! Any event that may let the orchestrator make progress (queue space
//! freed, result recorded, job requeued) calls [`Dispatcher::wake`].

use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use v2t_core::job::{Job, JobMeta};
use v2t_core::queue::{FailureOutcome, JobQueue, QueueStats, TaskState};

/// Why a job went back to the queue or was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    EmptyResult,
    InflightTimeout,
}

impl FailureReason {
    fn as_str(self) -> &'static str {
        match self {
            FailureReason::EmptyResult => "empty_result",
            FailureReason::InflightTimeout => "inflight_timeout",
        }
    }
}

/// Async front of the job queue.
#[derive(Debug)]
pub struct Dispatcher {
    queue: Mutex<JobQueue>,
    wake: Notify,
    max_queue: usize,
}

impl Dispatcher {
    pub fn new(max_queue: usize, max_retries: u32, inflight_timeout: Duration) -> Self {
        Self {
            queue: Mutex::new(JobQueue::new(max_retries, inflight_timeout)),
            wake: Notify::new(),
            max_queue,
        }
    }

    pub fn max_queue(&self) -> usize {
        self.max_queue
    }

    /// Signal the orchestrator. A signal sent while nobody waits is kept
    /// for the next waiter.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Wait for the next [`wake`](Self::wake).
    pub async fn woken(&self) {
        self.wake.notified().await;
    }

    // -----------------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------------

    /// Whether the producer may create another job.
    pub async fn has_capacity(&self) -> bool {
        self.queue.lock().await.pending_len() < self.max_queue
    }

    pub async fn enqueue(&self, job: Job) -> bool {
        self.queue.lock().await.enqueue(job)
    }

    pub async fn task_state(&self, task_id: &str) -> TaskState {
        self.queue.lock().await.task_state(task_id)
    }

    /// States of several tasks, read under one lock so they are mutually
    /// consistent.
    pub async fn task_states(&self, task_ids: &[String]) -> Vec<TaskState> {
        let queue = self.queue.lock().await;
        task_ids.iter().map(|id| queue.task_state(id)).collect()
    }

    /// Nothing pending and nothing inflight.
    pub async fn is_drained(&self) -> bool {
        self.queue.lock().await.is_drained()
    }

    // -----------------------------------------------------------------------
    // Worker side
    // -----------------------------------------------------------------------

    /// Hand out the next job, marking it inflight.
    pub async fn dequeue(&self) -> Option<Job> {
        let job = self.queue.lock().await.dequeue(Instant::now());
        if job.is_some() {
            self.wake();
        }
        job
    }

    /// Metadata of the job currently inflight under `task_id`.
    pub async fn inflight_meta(&self, task_id: &str) -> Option<JobMeta> {
        self.queue.lock().await.inflight_meta(task_id).cloned()
    }

    /// Release the inflight record after the result was persisted.
    /// Returns `false` for late or duplicate results.
    pub async fn complete_success(&self, task_id: &str) -> bool {
        let was_inflight = self.queue.lock().await.complete_success(task_id);
        self.wake();
        was_inflight
    }

    /// Record an empty or unusable result.
    pub async fn complete_failure(&self, task_id: &str) -> FailureOutcome {
        let outcome = self.queue.lock().await.complete_failure(task_id);
        log_failure(task_id, &outcome, FailureReason::EmptyResult);
        self.wake();
        outcome
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Requeue jobs that have been inflight for longer than the timeout.
    pub async fn sweep_timeouts(&self) -> usize {
        self.sweep_timeouts_at(Instant::now()).await
    }

    pub async fn sweep_timeouts_at(&self, now: Instant) -> usize {
        let expired = self.queue.lock().await.sweep_timeouts(now);
        for (task_id, outcome) in &expired {
            log_failure(task_id, outcome, FailureReason::InflightTimeout);
        }
        if !expired.is_empty() {
            self.wake();
        }
        expired.len()
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.lock().await.stats()
    }

    #[cfg(test)]
    pub(crate) async fn lock_queue(&self) -> tokio::sync::MutexGuard<'_, JobQueue> {
        self.queue.lock().await
    }
}

fn log_failure(task_id: &str, outcome: &FailureOutcome, reason: FailureReason) {
    match outcome {
        FailureOutcome::Requeued { attempt } => {
            tracing::warn!(
                task_id,
                attempt,
                reason = reason.as_str(),
                "Job requeued",
            );
        }
        FailureOutcome::Abandoned { attempts } => {
            tracing::error!(
                task_id,
                attempts,
                reason = reason.as_str(),
                "Job abandoned after exhausting retries",
            );
        }
        FailureOutcome::NotInflight => {
            tracing::debug!(task_id, "Failure reported for a job that is not inflight");
        }
    }
}

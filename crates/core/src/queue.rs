//! Pending queue, inflight set and retry bookkeeping for window jobs.
//!
//! [`JobQueue`] is plain data with no locking and no clock of its own;
//! callers pass `now` in. The pipeline wraps it in a single mutex, which
//! makes every method below atomic with respect to the others.
//!
//! The queue does **not** bound its own length. Backpressure is the
//! producer's job: it must stop creating jobs while
//! [`JobQueue::pending_len`] is at or above its configured maximum.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::job::{Job, JobMeta};

/// Default number of failed attempts tolerated before a job is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default age after which an inflight job is presumed lost.
pub const DEFAULT_INFLIGHT_TIMEOUT: Duration = Duration::from_secs(300);

/// A job that has been handed to a worker and not yet resolved.
#[derive(Debug, Clone)]
pub struct InflightRecord {
    pub job: Job,
    pub dispatched_at: Instant,
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Requeued; `attempt` is the new retry count.
    Requeued { attempt: u32 },
    /// Retry budget exhausted; the job will not be produced again.
    Abandoned { attempts: u32 },
    /// The task was not inflight (late or duplicate report); nothing changed.
    NotInflight,
}

/// Where a task stands as far as the queue knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Pending or inflight.
    Active,
    /// Retry budget exhausted.
    Abandoned,
    /// Never queued, or resolved successfully.
    Idle,
}

/// Where a requeued job goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requeue {
    Head,
    Tail,
}

/// Point-in-time counters for health/stats reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub inflight: usize,
    pub retrying: usize,
    pub abandoned: usize,
}

/// FIFO of pending jobs plus the inflight map and retry counters.
#[derive(Debug)]
pub struct JobQueue {
    pending: VecDeque<Job>,
    inflight: HashMap<String, InflightRecord>,
    retries: HashMap<String, u32>,
    abandoned: HashSet<String>,
    max_retries: u32,
    inflight_timeout: Duration,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_INFLIGHT_TIMEOUT)
    }
}

impl JobQueue {
    pub fn new(max_retries: u32, inflight_timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            inflight: HashMap::new(),
            retries: HashMap::new(),
            abandoned: HashSet::new(),
            max_retries,
            inflight_timeout,
        }
    }

    /// Append a job to the tail of the queue.
    ///
    /// Returns `false` (and drops the job) when a job with the same task
    /// id is already pending or inflight, or has been abandoned.
    pub fn enqueue(&mut self, job: Job) -> bool {
        if self.is_active(&job.task_id) || self.abandoned.contains(&job.task_id) {
            return false;
        }
        self.pending.push_back(job);
        true
    }

    /// Pop the head of the queue and mark it inflight as of `now`.
    pub fn dequeue(&mut self, now: Instant) -> Option<Job> {
        let job = self.pending.pop_front()?;
        self.inflight.insert(
            job.task_id.clone(),
            InflightRecord {
                job: job.clone(),
                dispatched_at: now,
            },
        );
        Some(job)
    }

    /// Resolve a successful attempt, removing the inflight record.
    ///
    /// Returns whether the task was inflight. A `false` means the result
    /// arrived after a timeout requeue (or twice); the caller still keeps
    /// it, and the stale pending copy is left to run again.
    pub fn complete_success(&mut self, task_id: &str) -> bool {
        self.inflight.remove(task_id).is_some()
    }

    /// Resolve a failed attempt (empty or unparseable answer).
    ///
    /// The job is requeued at the **head** so explicit failures are
    /// retried before fresh work.
    pub fn complete_failure(&mut self, task_id: &str) -> FailureOutcome {
        match self.inflight.remove(task_id) {
            Some(record) => self.retry(record.job, Requeue::Head),
            None => FailureOutcome::NotInflight,
        }
    }

    /// Requeue every inflight job dispatched more than the configured
    /// timeout before `now`.
    ///
    /// Timed-out jobs go to the **tail**: they may still be running
    /// upstream, so they rank below explicit failures.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<(String, FailureOutcome)> {
        let mut expired: Vec<(String, Instant)> = self
            .inflight
            .iter()
            .filter(|(_, rec)| now.saturating_duration_since(rec.dispatched_at) > self.inflight_timeout)
            .map(|(id, rec)| (id.clone(), rec.dispatched_at))
            .collect();
        // Oldest first, so requeue order is deterministic.
        expired.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        expired
            .into_iter()
            .filter_map(|(task_id, _)| {
                let record = self.inflight.remove(&task_id)?;
                let outcome = self.retry(record.job, Requeue::Tail);
                Some((task_id, outcome))
            })
            .collect()
    }

    fn retry(&mut self, job: Job, position: Requeue) -> FailureOutcome {
        let attempts = self.retries.entry(job.task_id.clone()).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;

        if attempts > self.max_retries {
            self.abandoned.insert(job.task_id);
            return FailureOutcome::Abandoned { attempts };
        }

        match position {
            Requeue::Head => self.pending.push_front(job),
            Requeue::Tail => self.pending.push_back(job),
        }
        FailureOutcome::Requeued { attempt: attempts }
    }

    /// Whether a job with this id is pending or inflight.
    pub fn is_active(&self, task_id: &str) -> bool {
        self.inflight.contains_key(task_id) || self.pending.iter().any(|j| j.task_id == task_id)
    }

    pub fn is_abandoned(&self, task_id: &str) -> bool {
        self.abandoned.contains(task_id)
    }

    pub fn task_state(&self, task_id: &str) -> TaskState {
        if self.is_abandoned(task_id) {
            TaskState::Abandoned
        } else if self.is_active(task_id) {
            TaskState::Active
        } else {
            TaskState::Idle
        }
    }

    /// Metadata of an inflight job, if the task is currently inflight.
    pub fn inflight_meta(&self, task_id: &str) -> Option<&JobMeta> {
        self.inflight.get(task_id).map(|rec| &rec.job.meta)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// Nothing pending and nothing inflight.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.inflight.is_empty()
    }

    pub fn retry_count(&self, task_id: &str) -> u32 {
        self.retries.get(task_id).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            inflight: self.inflight.len(),
            retrying: self
                .retries
                .keys()
                .filter(|id| !self.abandoned.contains(*id) && self.is_active(id))
                .count(),
            abandoned: self.abandoned.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Result submission: decide retry vs. record, then persist.

use std::sync::Arc;

use v2t_core::error::CoreError;
use v2t_core::job::{ResultSubmission, VlmAnswer, WindowRecord};
use v2t_store::{RunStore, SampleLocks};

use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;

/// What happened to a submitted result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Answer appended to the sample's log. `late` is set when the job
    /// was no longer inflight (timed out and requeued, or a duplicate).
    Received { late: bool },
    /// Empty or malformed answer; the job was requeued or abandoned.
    RetryTriggered,
}

/// Accepts worker results on behalf of the HTTP layer.
#[derive(Debug, Clone)]
pub struct ResultIntake {
    dispatcher: Arc<Dispatcher>,
    store: RunStore,
    locks: SampleLocks,
}

impl ResultIntake {
    pub fn new(dispatcher: Arc<Dispatcher>, store: RunStore, locks: SampleLocks) -> Self {
        Self {
            dispatcher,
            store,
            locks,
        }
    }

    /// Handle one submission.
    ///
    /// A usable answer is appended under the sample lock **before** the
    /// inflight record is released, so a window is always either active
    /// or recorded. If the append fails the job stays inflight and is
    /// recovered by the timeout sweep.
    pub async fn submit(&self, submission: ResultSubmission) -> Result<SubmitOutcome, PipelineError> {
        let task_id = submission.task_id.trim();
        if task_id.is_empty() {
            return Err(CoreError::Validation("task_id must not be empty".into()).into());
        }

        let Some(answer) = VlmAnswer::from_value(&submission.vlm_json) else {
            self.dispatcher.complete_failure(task_id).await;
            return Ok(SubmitOutcome::RetryTriggered);
        };

        // Trust our own record of the job over the echoed copy.
        let meta = match self.dispatcher.inflight_meta(task_id).await {
            Some(meta) => meta,
            None => submission.meta.ok_or_else(|| {
                CoreError::Validation(format!("meta is required for task '{task_id}'"))
            })?,
        };
        meta.validate()?;
        if meta.task_id() != task_id {
            return Err(CoreError::Validation(format!(
                "meta does not match task '{task_id}' (expected '{}')",
                meta.task_id()
            ))
            .into());
        }

        let record = WindowRecord {
            task_id: task_id.to_string(),
            window_id: meta.window_id,
            vlm_json: answer,
        };
        {
            let _guard = self.locks.acquire(&meta.subset, &meta.sample_id).await;
            self.store
                .append_window_record(&meta.subset, &meta.sample_id, &record)
                .await?;
        }

        let was_inflight = self.dispatcher.complete_success(task_id).await;
        if was_inflight {
            tracing::debug!(
                task_id,
                latency_s = submission.latency_s,
                transitions = ?record.vlm_json.transitions,
                "Result recorded",
            );
        } else {
            tracing::info!(task_id, "Late result recorded");
        }
        Ok(SubmitOutcome::Received {
            late: !was_inflight,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde_json::json;
    use v2t_core::job::{Job, JobMeta};

    use super::*;

    fn meta(window_id: usize) -> JobMeta {
        JobMeta {
            subset: "ds".into(),
            sample_id: "s1".into(),
            window_id,
            frame_ids: vec![0, 1],
        }
    }

    fn setup(dir: &std::path::Path) -> (Arc<Dispatcher>, ResultIntake, RunStore) {
        let dispatcher = Arc::new(Dispatcher::new(8, 2, Duration::from_secs(60)));
        let store = RunStore::new(dir, "run");
        let intake = ResultIntake::new(dispatcher.clone(), store.clone(), SampleLocks::new());
        (dispatcher, intake, store)
    }

    fn submission(window_id: usize, vlm_json: serde_json::Value) -> ResultSubmission {
        ResultSubmission {
            task_id: meta(window_id).task_id(),
            vlm_json,
            meta: Some(meta(window_id)),
            latency_s: Some(1.5),
            vlm_output: None,
        }
    }

    #[tokio::test]
    async fn valid_result_is_recorded_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, intake, store) = setup(dir.path());
        dispatcher.enqueue(Job::new(meta(0), vec![])).await;
        dispatcher.dequeue().await.unwrap();

        let outcome = intake
            .submit(submission(0, json!({"transitions": [1], "instructions": ["a", "b"]})))
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::Received { late: false });
        assert!(dispatcher.is_drained().await);
        let loaded = store.load_window_records("ds", "s1").await.unwrap();
        assert_eq!(loaded.results[&0].transitions, vec![1]);
    }

    #[tokio::test]
    async fn empty_result_triggers_retry_at_head() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, intake, store) = setup(dir.path());
        dispatcher.enqueue(Job::new(meta(0), vec![])).await;
        dispatcher.enqueue(Job::new(meta(1), vec![])).await;
        dispatcher.dequeue().await.unwrap();

        let outcome = intake.submit(submission(0, json!({}))).await.unwrap();

        assert_eq!(outcome, SubmitOutcome::RetryTriggered);
        assert_eq!(dispatcher.dequeue().await.unwrap().meta.window_id, 0);
        assert!(store.load_window_records("ds", "s1").await.unwrap().results.is_empty());
    }

    #[tokio::test]
    async fn late_result_is_still_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (_dispatcher, intake, store) = setup(dir.path());

        let outcome = intake
            .submit(submission(3, json!({"instructions": ["late"]})))
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::Received { late: true });
        let loaded = store.load_window_records("ds", "s1").await.unwrap();
        assert_eq!(loaded.results[&3].instructions, vec!["late"]);
    }

    #[tokio::test]
    async fn mismatched_or_missing_meta_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_dispatcher, intake, _store) = setup(dir.path());

        let mut wrong = submission(0, json!({"instructions": ["a"]}));
        wrong.task_id = "ds::s1_w9".into();
        assert_matches!(intake.submit(wrong).await, Err(PipelineError::Core(_)));

        let mut missing = submission(0, json!({"instructions": ["a"]}));
        missing.meta = None;
        assert_matches!(intake.submit(missing).await, Err(PipelineError::Core(_)));

        let mut traversal = submission(0, json!({"instructions": ["a"]}));
        traversal.meta = Some(JobMeta {
            subset: "..".into(),
            ..meta(0)
        });
        traversal.task_id = "..::s1_w0".into();
        assert_matches!(intake.submit(traversal).await, Err(PipelineError::Core(_)));
    }

    #[tokio::test]
    async fn blank_task_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_dispatcher, intake, _store) = setup(dir.path());

        let mut blank = submission(0, json!({}));
        blank.task_id = "  ".into();

        assert_matches!(intake.submit(blank).await, Err(PipelineError::Core(_)));
    }
}

//! Pull / infer / submit loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use v2t_core::job::{Job, JobPoll, ResultSubmission, SubmitStatus, VlmAnswer};
use v2t_vlm::frames::normalize_frames;
use v2t_vlm::prompt::switch_detection_prompt;
use v2t_vlm::VlmBackend;

use crate::backoff::next_delay;
use crate::client::ServerClient;
use crate::config::WorkerConfig;

/// One worker process: a server connection plus an inference backend.
pub struct Worker {
    client: ServerClient,
    backend: Arc<dyn VlmBackend>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(client: ServerClient, backend: Arc<dyn VlmBackend>, config: WorkerConfig) -> Self {
        Self {
            client,
            backend,
            config,
        }
    }

    /// Process jobs until `cancel` fires. A job already being processed is
    /// finished and submitted before returning.
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.backend
            .warmup()
            .await
            .with_context(|| format!("warmup of backend '{}' failed", self.backend.name()))?;
        tracing::info!(
            server = %self.client.base_url(),
            backend = self.backend.name(),
            "Worker started",
        );

        let mut delay = self.config.backoff.initial_delay;
        loop {
            let poll = tokio::select! {
                _ = cancel.cancelled() => break,
                poll = self.client.poll_job() => poll,
            };

            match poll {
                Ok(JobPoll::Ok(job)) => {
                    delay = self.config.backoff.initial_delay;
                    let task_id = job.task_id.clone();
                    match self.process(job).await {
                        Ok(status) => tracing::info!(%task_id, ?status, "Result submitted"),
                        Err(e) => tracing::warn!(%task_id, error = ?e, "Job failed"),
                    }
                }
                Ok(JobPoll::Empty) => {
                    delay = self.config.backoff.initial_delay;
                    if sleep_or_cancel(self.config.idle_delay, cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Cannot poll dispatch server",
                    );
                    if sleep_or_cancel(delay, cancel).await {
                        break;
                    }
                    delay = next_delay(delay, &self.config.backoff);
                }
            }
        }

        tracing::info!("Worker stopped");
        Ok(())
    }

    /// Run inference for one job and report the outcome. An unusable
    /// answer is reported as `{}` so the server requeues the job.
    pub async fn process(&self, job: Job) -> anyhow::Result<SubmitStatus> {
        let started = Instant::now();
        let task_id = job.task_id;

        let (images, replaced) =
            normalize_frames(job.images).context("failed to prepare frame payloads")?;
        if replaced > 0 {
            tracing::warn!(%task_id, replaced, "Replaced undecodable frames with placeholders");
        }

        let prompt = switch_detection_prompt(images.len());
        let answer = self.infer_with_retries(&task_id, &images, &prompt).await;
        let vlm_json = match answer {
            Some(answer) => serde_json::to_value(answer).context("failed to encode answer")?,
            None => json!({}),
        };

        let submission = ResultSubmission {
            task_id: task_id.clone(),
            vlm_json,
            meta: Some(job.meta),
            latency_s: Some(started.elapsed().as_secs_f64()),
            vlm_output: None,
        };
        self.client
            .submit(&submission)
            .await
            .with_context(|| format!("failed to submit result for {task_id}"))
    }

    async fn infer_with_retries(
        &self,
        task_id: &str,
        images: &[String],
        prompt: &str,
    ) -> Option<VlmAnswer> {
        let attempts = self.config.max_local_retries.max(1);
        for attempt in 1..=attempts {
            match self.backend.infer(images, prompt).await {
                Ok(Some(answer)) => return Some(answer),
                Ok(None) => {
                    tracing::debug!(task_id, attempt, "Backend returned no usable answer");
                }
                Err(e) => {
                    tracing::warn!(task_id, attempt, error = %e, "Inference failed");
                }
            }
        }
        None
    }
}

/// Sleep for `duration`; returns `true` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

//! Per-sample driver: turns missing windows into jobs and finalizes a
//! sample once every window has a recorded answer.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use v2t_core::job::{task_id, Job, JobMeta};
use v2t_core::queue::TaskState;
use v2t_core::sample_state::SampleStatus;
use v2t_core::segments::build_segments;
use v2t_core::types::WindowId;
use v2t_core::windowing::{build_windows, Window, WindowingConfig};
use v2t_store::{RunStore, SampleLocks};

use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;
use crate::frames::{FrameSource, VideoInfo};

/// A sample the orchestrator is currently working on.
#[derive(Debug, Clone)]
pub struct SampleContext {
    pub subset: String,
    pub sample_id: String,
    pub video: PathBuf,
    pub info: VideoInfo,
    pub windows: Vec<Window>,
    pub status: SampleStatus,
}

impl SampleContext {
    pub fn new(
        subset: &str,
        sample_id: &str,
        video: PathBuf,
        info: VideoInfo,
        windowing: &WindowingConfig,
    ) -> Self {
        Self {
            subset: subset.to_string(),
            sample_id: sample_id.to_string(),
            windows: build_windows(info.fps, info.frame_count, windowing),
            video,
            info,
            status: SampleStatus::NeedsWindows,
        }
    }

    fn task_id(&self, window_id: WindowId) -> String {
        task_id(&self.subset, &self.sample_id, window_id)
    }

    /// Move to `to`, refusing transitions the state machine forbids.
    pub fn transition(&mut self, to: SampleStatus) -> Result<(), PipelineError> {
        self.status.validate_transition(to)?;
        self.status = to;
        Ok(())
    }
}

/// Result of one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOutcome {
    pub created: usize,
    /// The pass created nothing: every window is recorded, active or
    /// abandoned.
    pub complete: bool,
}

/// Result of a finalize attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Segments written and the done marker is present. `newly_done` is
    /// false when the marker already existed.
    Done { newly_done: bool, segments: usize },
    /// Some missing windows are still queued or inflight.
    Blocked { missing: Vec<WindowId> },
    /// Missing windows were abandoned; the sample cannot be completed in
    /// this process.
    Incomplete { abandoned: Vec<WindowId> },
    /// Missing windows are neither active nor abandoned (lost from the
    /// log); they must be planned again.
    Replan { missing: Vec<WindowId> },
}

/// Planning and finalization for one sample at a time.
pub struct SampleDriver {
    dispatcher: Arc<Dispatcher>,
    store: RunStore,
    locks: SampleLocks,
    frames: Arc<dyn FrameSource>,
    windowing: WindowingConfig,
    max_jobs_per_pass: usize,
}

impl SampleDriver {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        store: RunStore,
        locks: SampleLocks,
        frames: Arc<dyn FrameSource>,
        windowing: WindowingConfig,
        max_jobs_per_pass: usize,
    ) -> Self {
        Self {
            dispatcher,
            store,
            locks,
            frames,
            windowing,
            max_jobs_per_pass,
        }
    }

    pub fn windowing(&self) -> &WindowingConfig {
        &self.windowing
    }

    /// Enqueue jobs for windows that have neither a recorded answer nor an
    /// active job, in window order, while the queue has room. The sample
    /// is ready to finalize once a pass finds nothing left to create.
    pub async fn plan(&self, sample: &SampleContext) -> Result<PlanOutcome, PipelineError> {
        let recorded: BTreeSet<WindowId> = self
            .store
            .load_window_records(&sample.subset, &sample.sample_id)
            .await?
            .window_ids()
            .collect();

        let mut created = 0;
        for window in &sample.windows {
            if recorded.contains(&window.window_id) {
                continue;
            }
            let task_id = sample.task_id(window.window_id);
            if self.dispatcher.task_state(&task_id).await != TaskState::Idle {
                continue;
            }
            if created >= self.max_jobs_per_pass || !self.dispatcher.has_capacity().await {
                return Ok(PlanOutcome {
                    created,
                    complete: false,
                });
            }

            let images = self
                .frames
                .extract_frames(&sample.video, &window.frame_ids)
                .await?;
            let job = Job::new(
                JobMeta {
                    subset: sample.subset.clone(),
                    sample_id: sample.sample_id.clone(),
                    window_id: window.window_id,
                    frame_ids: window.frame_ids.clone(),
                },
                images,
            );
            if self.dispatcher.enqueue(job).await {
                created += 1;
                tracing::debug!(task_id, "Job enqueued");
            }
        }

        Ok(PlanOutcome {
            created,
            complete: created == 0,
        })
    }

    /// Reconstruct and persist the sample's segments if every window has
    /// an answer. Safe to call repeatedly: the artifact is rewritten with
    /// identical content and only the first call creates the marker.
    ///
    /// The sample lock covers reading the log and writing the outputs. It
    /// is released before the dispatcher is consulted about missing
    /// windows; a result that lands in between shows up as `Replan`, and
    /// the next planning pass sees it recorded.
    pub async fn finalize(&self, sample: &SampleContext) -> Result<FinalizeOutcome, PipelineError> {
        let guard = self.locks.acquire(&sample.subset, &sample.sample_id).await;

        let log = self
            .store
            .load_window_records(&sample.subset, &sample.sample_id)
            .await?;
        let missing: Vec<WindowId> = sample
            .windows
            .iter()
            .map(|w| w.window_id)
            .filter(|id| !log.results.contains_key(id))
            .collect();

        if !missing.is_empty() {
            drop(guard);
            let task_ids: Vec<String> = missing.iter().map(|&id| sample.task_id(id)).collect();
            let states = self.dispatcher.task_states(&task_ids).await;
            if states.contains(&TaskState::Active) {
                return Ok(FinalizeOutcome::Blocked { missing });
            }
            let abandoned: Vec<WindowId> = missing
                .iter()
                .zip(&states)
                .filter(|(_, state)| **state == TaskState::Abandoned)
                .map(|(&id, _)| id)
                .collect();
            if !abandoned.is_empty() {
                return Ok(FinalizeOutcome::Incomplete { abandoned });
            }
            return Ok(FinalizeOutcome::Replan { missing });
        }

        let artifact = build_segments(
            &sample.sample_id,
            &sample.windows,
            &log.results,
            sample.info.fps,
            sample.info.frame_count,
            self.windowing.frames_per_window,
        );
        self.store.write_segments(&sample.subset, &artifact).await?;
        let newly_done = self.store.mark_done(&sample.subset, &sample.sample_id).await?;

        Ok(FinalizeOutcome::Done {
            newly_done,
            segments: artifact.segments.len(),
        })
    }
}

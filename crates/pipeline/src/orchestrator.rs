//! Background producer: walks datasets and samples in order, plans jobs,
//! sweeps timeouts and finalizes samples.
//!
//! The orchestrator owns the only mutable cursor over the catalog. It
//! sleeps until the dispatcher signals progress, the tick interval
//! elapses or the run is cancelled, then advances as far as it can.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use v2t_core::sample_state::SampleStatus;
use v2t_store::{RunStore, SampleLocks};

use crate::catalog::{Dataset, DatasetSpec};
use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::frames::FrameSource;
use crate::progress::Progress;
use crate::sample::{FinalizeOutcome, SampleContext, SampleDriver};

/// Outcome of a single orchestration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// State moved; step again right away.
    Advanced,
    /// Waiting on workers or queue space.
    Blocked,
    /// Every dataset is drained.
    Finished,
}

/// How the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Cancelled,
    /// All datasets processed and auto-exit is enabled.
    AllDone,
}

pub struct Orchestrator {
    datasets: Vec<Dataset>,
    dataset_idx: usize,
    sample_idx: usize,
    current: Option<SampleContext>,
    driver: SampleDriver,
    dispatcher: Arc<Dispatcher>,
    store: RunStore,
    frames: Arc<dyn FrameSource>,
    progress: Arc<Progress>,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Discover samples, count already finished ones and log the plan.
    pub async fn start(
        specs: Vec<DatasetSpec>,
        config: PipelineConfig,
        dispatcher: Arc<Dispatcher>,
        store: RunStore,
        locks: SampleLocks,
        frames: Arc<dyn FrameSource>,
        progress: Arc<Progress>,
    ) -> Self {
        let mut datasets = Vec::with_capacity(specs.len());
        for spec in specs {
            datasets.push(Dataset::discover(spec).await);
        }

        let computed_total: usize = datasets.iter().map(|d| d.sample_ids.len()).sum();
        let total = if config.progress_total_override > 0 {
            config.progress_total_override
        } else {
            computed_total
        };

        let mut already_done = 0;
        for dataset in &datasets {
            for sample_id in &dataset.sample_ids {
                if store.is_done(dataset.subset(), sample_id).await.unwrap_or(false) {
                    already_done += 1;
                }
            }
        }
        progress.init(total, already_done);

        tracing::info!(
            datasets = ?datasets
                .iter()
                .map(|d| d.spec.data_dir().display().to_string())
                .collect::<Vec<_>>(),
            frames_per_window = config.windowing.frames_per_window,
            width = config.encoding.width,
            height = config.encoding.height,
            "Orchestrator started",
        );
        tracing::info!(already_done, total, computed_total, "Resuming run");

        let driver = SampleDriver::new(
            dispatcher.clone(),
            store.clone(),
            locks,
            frames.clone(),
            config.windowing.clone(),
            config.max_jobs_per_pass,
        );

        Self {
            datasets,
            dataset_idx: 0,
            sample_idx: 0,
            current: None,
            driver,
            dispatcher,
            store,
            frames,
            progress,
            config,
        }
    }

    /// Drive the catalog until cancelled, or until everything is done when
    /// auto-exit is enabled.
    pub async fn run(mut self, cancel: CancellationToken) -> RunExit {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            self.dispatcher.sweep_timeouts().await;

            let mut step = self.step().await;
            while step == Step::Advanced {
                tokio::task::yield_now().await;
                step = self.step().await;
            }

            if step == Step::Finished && self.config.auto_exit_after_all_done {
                let snapshot = self.progress.snapshot();
                tracing::info!(
                    done = snapshot.done,
                    total = snapshot.total,
                    "All datasets processed; exiting",
                );
                return RunExit::AllDone;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Orchestrator cancelled");
                    return RunExit::Cancelled;
                }
                _ = ticker.tick() => {}
                _ = self.dispatcher.woken() => {}
            }
        }
    }

    /// Make one unit of progress on the current sample or dataset.
    pub async fn step(&mut self) -> Step {
        let Some(dataset) = self.datasets.get(self.dataset_idx) else {
            self.progress.mark_finished();
            return Step::Finished;
        };

        if self.sample_idx >= dataset.sample_ids.len() {
            if !self.dispatcher.is_drained().await {
                return Step::Blocked;
            }
            tracing::info!(subset = %dataset.subset(), "Dataset completed; switching to next");
            self.dataset_idx += 1;
            self.sample_idx = 0;
            return Step::Advanced;
        }

        if self.current.is_none() {
            let subset = dataset.subset().to_string();
            let sample_id = dataset.sample_ids[self.sample_idx].clone();
            let sample_dir = dataset.sample_dir(&sample_id);
            match self.store.is_done(&subset, &sample_id).await {
                Ok(true) => {
                    self.next_sample();
                    return Step::Advanced;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%subset, %sample_id, error = %e, "Cannot check done marker; skipping");
                    self.skip_sample();
                    return Step::Advanced;
                }
            }

            let Some(video) = self.config.video.find_video(&sample_dir).await else {
                tracing::warn!(
                    %subset,
                    %sample_id,
                    dir = %sample_dir.display(),
                    "No video found; skipping sample",
                );
                self.skip_sample();
                return Step::Advanced;
            };
            let info = match self.frames.open(&video).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(%subset, %sample_id, error = %e, "Cannot open video; skipping sample");
                    self.skip_sample();
                    return Step::Advanced;
                }
            };

            tracing::debug!(%subset, %sample_id, fps = info.fps, frames = info.frame_count, "Sample opened");
            self.current = Some(SampleContext::new(
                &subset,
                &sample_id,
                video,
                info,
                self.driver.windowing(),
            ));
        }

        let Some(status) = self.current.as_ref().map(|s| s.status) else {
            return Step::Advanced;
        };
        match status {
            SampleStatus::NeedsWindows => self.plan_current().await,
            SampleStatus::AwaitingFinalize => self.finalize_current().await,
            SampleStatus::Done | SampleStatus::Incomplete => {
                self.next_sample();
                Step::Advanced
            }
        }
    }

    async fn plan_current(&mut self) -> Step {
        let Some(sample) = self.current.as_mut() else {
            return Step::Advanced;
        };
        match self.driver.plan(sample).await {
            Ok(outcome) if outcome.complete => {
                if let Err(e) = sample.transition(SampleStatus::AwaitingFinalize) {
                    tracing::error!(subset = %sample.subset, sample_id = %sample.sample_id, error = %e, "Invalid sample transition");
                }
                Step::Advanced
            }
            Ok(outcome) if outcome.created > 0 => Step::Advanced,
            Ok(_) => Step::Blocked,
            Err(e) => {
                tracing::warn!(
                    subset = %sample.subset,
                    sample_id = %sample.sample_id,
                    error = %e,
                    "Planning failed; skipping sample",
                );
                self.skip_sample();
                Step::Advanced
            }
        }
    }

    async fn finalize_current(&mut self) -> Step {
        let Some(sample) = self.current.as_mut() else {
            return Step::Advanced;
        };
        let outcome = match self.driver.finalize(sample).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    subset = %sample.subset,
                    sample_id = %sample.sample_id,
                    error = %e,
                    "Finalize failed; will retry",
                );
                return Step::Blocked;
            }
        };

        let next = match &outcome {
            FinalizeOutcome::Done { newly_done, segments } => {
                let done = if *newly_done {
                    self.progress.record_done()
                } else {
                    self.progress.snapshot().done
                };
                tracing::info!(
                    subset = %sample.subset,
                    sample_id = %sample.sample_id,
                    segments,
                    done,
                    total = self.progress.total(),
                    "Sample finalized",
                );
                SampleStatus::Done
            }
            FinalizeOutcome::Blocked { .. } => return Step::Blocked,
            FinalizeOutcome::Incomplete { abandoned } => {
                tracing::error!(
                    subset = %sample.subset,
                    sample_id = %sample.sample_id,
                    ?abandoned,
                    "Sample left incomplete; windows abandoned",
                );
                self.progress.record_incomplete();
                SampleStatus::Incomplete
            }
            FinalizeOutcome::Replan { missing } => {
                tracing::warn!(
                    subset = %sample.subset,
                    sample_id = %sample.sample_id,
                    ?missing,
                    "Windows missing from log; planning again",
                );
                SampleStatus::NeedsWindows
            }
        };

        if let Err(e) = sample.transition(next) {
            tracing::error!(subset = %sample.subset, sample_id = %sample.sample_id, error = %e, "Invalid sample transition");
            return Step::Blocked;
        }
        Step::Advanced
    }

    fn next_sample(&mut self) {
        self.current = None;
        self.sample_idx += 1;
    }

    fn skip_sample(&mut self) {
        self.progress.record_skipped();
        self.next_sample();
    }
}

//! End-to-end: catalog on disk, in-memory video source, fake workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use v2t_core::job::ResultSubmission;
use v2t_core::segments::SegmentArtifact;
use v2t_core::types::FrameId;
use v2t_pipeline::{
    DatasetSpec, Dispatcher, FrameSource, FrameSourceError, Orchestrator, PipelineConfig,
    Progress, ResultIntake, RunExit, Step, SubmitOutcome, VideoInfo,
};
use v2t_store::{RunStore, SampleLocks};

/// Every video is 10 seconds at 30fps: a single window.
struct StaticVideos;

#[async_trait]
impl FrameSource for StaticVideos {
    async fn open(&self, video: &Path) -> Result<VideoInfo, FrameSourceError> {
        if video.to_string_lossy().contains("broken") {
            return Err(FrameSourceError::ParseError("no video stream".into()));
        }
        Ok(VideoInfo {
            fps: 30.0,
            frame_count: 300,
        })
    }

    async fn extract_frames(
        &self,
        _video: &Path,
        frame_ids: &[FrameId],
    ) -> Result<Vec<String>, FrameSourceError> {
        Ok(frame_ids.iter().map(|id| format!("frame-{id}")).collect())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    data_root: PathBuf,
    store: RunStore,
    dispatcher: Arc<Dispatcher>,
    intake: ResultIntake,
    progress: Arc<Progress>,
    locks: SampleLocks,
}

impl Harness {
    fn new(samples: &[(&str, Option<&str>)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_root = dir.path().join("data");
        for (sample_id, video) in samples {
            let sample_dir = data_root.join("kitchen").join(sample_id);
            std::fs::create_dir_all(&sample_dir).unwrap();
            if let Some(video) = video {
                std::fs::write(sample_dir.join(video), b"").unwrap();
            }
        }

        let store = RunStore::new(dir.path().join("runs"), "test");
        let dispatcher = Arc::new(Dispatcher::new(4, 2, Duration::from_secs(60)));
        let locks = SampleLocks::new();
        let intake = ResultIntake::new(dispatcher.clone(), store.clone(), locks.clone());
        Self {
            _dir: dir,
            data_root,
            store,
            dispatcher,
            intake,
            progress: Arc::new(Progress::new()),
            locks,
        }
    }

    async fn orchestrator(&self, config: PipelineConfig) -> Orchestrator {
        Orchestrator::start(
            vec![DatasetSpec {
                root: self.data_root.clone(),
                subset: "kitchen".into(),
            }],
            config,
            self.dispatcher.clone(),
            self.store.clone(),
            self.locks.clone(),
            Arc::new(StaticVideos),
            self.progress.clone(),
        )
        .await
    }

    /// Pull one job and answer it like a worker would.
    async fn work_one(&self, vlm_json: serde_json::Value) -> Option<SubmitOutcome> {
        let job = self.dispatcher.dequeue().await?;
        let outcome = self
            .intake
            .submit(ResultSubmission {
                task_id: job.task_id.clone(),
                vlm_json,
                meta: Some(job.meta.clone()),
                latency_s: Some(0.1),
                vlm_output: None,
            })
            .await
            .unwrap();
        Some(outcome)
    }

    fn artifact(&self, sample_id: &str) -> SegmentArtifact {
        let path = self.store.sample_paths("kitchen", sample_id).unwrap().segments;
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }
}

async fn step_until_blocked(orchestrator: &mut Orchestrator) -> Step {
    loop {
        match orchestrator.step().await {
            Step::Advanced => continue,
            other => return other,
        }
    }
}

fn answer() -> serde_json::Value {
    json!({"transitions": [8], "instructions": ["Open drawer", "Close drawer"]})
}

#[tokio::test]
async fn processes_every_sample_and_skips_missing_videos() {
    let h = Harness::new(&[
        ("s1", Some("Frame_0.mp4")),
        ("s2", None),
        ("s3", Some("Frame_0.mp4")),
    ]);
    let mut orchestrator = h.orchestrator(PipelineConfig::default()).await;

    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Blocked);
    assert_eq!(h.work_one(answer()).await, Some(SubmitOutcome::Received { late: false }));

    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Blocked);
    assert_eq!(h.work_one(answer()).await, Some(SubmitOutcome::Received { late: false }));

    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Finished);

    let snapshot = h.progress.snapshot();
    assert_eq!(snapshot.done, 2);
    assert_eq!(snapshot.skipped, 1);
    assert_eq!(snapshot.total, 3);
    assert!(snapshot.finished);

    let artifact = h.artifact("s1");
    assert_eq!(artifact.nframes, 300);
    let labels: Vec<_> = artifact.segments.iter().map(|s| s.instruction.as_str()).collect();
    assert_eq!(labels, vec!["Open drawer", "Close drawer"]);
    assert!(h.store.is_done("kitchen", "s3").await.unwrap());
}

#[tokio::test]
async fn empty_answer_is_retried_before_finalize() {
    let h = Harness::new(&[("s1", Some("Frame_0.mp4"))]);
    let mut orchestrator = h.orchestrator(PipelineConfig::default()).await;

    step_until_blocked(&mut orchestrator).await;
    assert_eq!(h.work_one(json!({})).await, Some(SubmitOutcome::RetryTriggered));
    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Blocked);
    assert!(!h.store.is_done("kitchen", "s1").await.unwrap());

    assert_matches!(h.work_one(answer()).await, Some(SubmitOutcome::Received { .. }));
    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Finished);
    assert!(h.store.is_done("kitchen", "s1").await.unwrap());
}

#[tokio::test]
async fn abandoned_window_leaves_sample_incomplete() {
    let h = Harness::new(&[("s1", Some("Frame_0.mp4"))]);
    let mut orchestrator = h.orchestrator(PipelineConfig::default()).await;

    step_until_blocked(&mut orchestrator).await;
    // max_retries = 2: three failures abandon the window.
    for _ in 0..3 {
        assert_eq!(h.work_one(json!({})).await, Some(SubmitOutcome::RetryTriggered));
    }

    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Finished);
    let snapshot = h.progress.snapshot();
    assert_eq!(snapshot.done, 0);
    assert_eq!(snapshot.incomplete, 1);
    assert!(!h.store.is_done("kitchen", "s1").await.unwrap());
}

#[tokio::test]
async fn resumes_from_done_markers_and_recorded_windows() {
    let h = Harness::new(&[
        ("s1", Some("Frame_0.mp4")),
        ("s2", Some("Frame_0.mp4")),
        ("broken", Some("Frame_0.mp4")),
    ]);
    h.store.mark_done("kitchen", "s1").await.unwrap();

    let mut orchestrator = h.orchestrator(PipelineConfig::default()).await;
    assert_eq!(h.progress.snapshot().done, 1);

    // "broken" sorts first and fails to open; s1 is already done.
    assert_eq!(step_until_blocked(&mut orchestrator).await, Step::Blocked);
    let job = h.dispatcher.dequeue().await.unwrap();
    assert_eq!(job.meta.sample_id, "s2");
    assert_eq!(job.images.len(), job.meta.frame_ids.len());
    assert!(job.images.iter().all(|img| img.starts_with("frame-")));
}

#[tokio::test]
async fn run_exits_after_all_done_with_concurrent_worker() {
    let h = Harness::new(&[("s1", Some("Frame_0.mp4")), ("s2", Some("Frame_0.mp4"))]);
    let config = PipelineConfig {
        auto_exit_after_all_done: true,
        tick_interval: Duration::from_millis(10),
        ..PipelineConfig::default()
    };
    let orchestrator = h.orchestrator(config).await;
    let cancel = CancellationToken::new();
    let run = tokio::spawn(orchestrator.run(cancel.clone()));

    let worker = {
        let dispatcher = h.dispatcher.clone();
        let intake = h.intake.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while !cancel.is_cancelled() {
                let Some(job) = dispatcher.dequeue().await else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    continue;
                };
                intake
                    .submit(ResultSubmission {
                        task_id: job.task_id.clone(),
                        vlm_json: answer(),
                        meta: Some(job.meta),
                        latency_s: None,
                        vlm_output: None,
                    })
                    .await
                    .unwrap();
            }
        })
    };

    let exit = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    cancel.cancel();
    worker.await.unwrap();

    assert_eq!(exit, RunExit::AllDone);
    assert_eq!(h.progress.snapshot().done, 2);
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let h = Harness::new(&[("s1", Some("Frame_0.mp4"))]);
    let orchestrator = h.orchestrator(PipelineConfig::default()).await;
    let cancel = CancellationToken::new();
    let run = tokio::spawn(orchestrator.run(cancel.clone()));

    cancel.cancel();
    let exit = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit, RunExit::Cancelled);
}

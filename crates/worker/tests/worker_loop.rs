//! Worker loop against an in-process mock of the dispatch server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use v2t_core::job::{Job, JobMeta, JobPoll, ResultSubmission, SubmitStatus, VlmAnswer};
use v2t_vlm::frames::placeholder_frame;
use v2t_vlm::{DummyBackend, VlmBackend, VlmError};
use v2t_worker::{ServerClient, Worker, WorkerConfig};

#[derive(Default)]
struct MockServer {
    jobs: Mutex<VecDeque<Job>>,
    submissions: Mutex<Vec<ResultSubmission>>,
}

async fn get_job(State(mock): State<Arc<MockServer>>) -> Json<JobPoll> {
    let next = mock.jobs.lock().unwrap().pop_front();
    Json(next.map_or(JobPoll::Empty, JobPoll::Ok))
}

async fn submit_result(
    State(mock): State<Arc<MockServer>>,
    Json(submission): Json<ResultSubmission>,
) -> Json<SubmitStatus> {
    let status = if VlmAnswer::from_value(&submission.vlm_json).is_some() {
        SubmitStatus::Received
    } else {
        SubmitStatus::RetryTriggered
    };
    mock.submissions.lock().unwrap().push(submission);
    Json(status)
}

async fn start_mock(jobs: Vec<Job>) -> (Arc<MockServer>, String) {
    let mock = Arc::new(MockServer {
        jobs: Mutex::new(jobs.into()),
        ..MockServer::default()
    });
    let app = Router::new()
        .route("/get_job", get(get_job))
        .route("/submit_result", post(submit_result))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, url)
}

fn job(window_id: usize, images: Vec<String>) -> Job {
    Job::new(
        JobMeta {
            subset: "kitchen".into(),
            sample_id: "ep_001".into(),
            window_id,
            frame_ids: (0..images.len()).collect(),
        },
        images,
    )
}

fn fast_config(server_url: &str) -> WorkerConfig {
    WorkerConfig {
        server_url: server_url.to_string(),
        idle_delay: Duration::from_millis(10),
        ..WorkerConfig::default()
    }
}

async fn wait_for_submissions(mock: &MockServer, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while mock.submissions.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker did not submit in time");
}

/// Backend that never produces an answer and counts its calls.
#[derive(Default)]
struct SilentBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl VlmBackend for SilentBackend {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn infer(&self, _images: &[String], _prompt: &str) -> Result<Option<VlmAnswer>, VlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(VlmError::Decode("model returned prose".into()))
    }
}

/// Backend that records the frames it was given.
#[derive(Default)]
struct RecordingBackend {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl VlmBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn infer(&self, images: &[String], _prompt: &str) -> Result<Option<VlmAnswer>, VlmError> {
        self.seen.lock().unwrap().extend(images.iter().cloned());
        Ok(Some(VlmAnswer {
            transitions: vec![],
            instructions: vec!["Stack plates".into()],
            thought: None,
        }))
    }
}

#[tokio::test]
async fn processes_jobs_until_cancelled() {
    let frame = placeholder_frame().unwrap();
    let (mock, url) = start_mock(vec![
        job(0, vec![frame.clone(); 16]),
        job(1, vec![frame.clone(); 4]),
    ])
    .await;
    let worker = Worker::new(
        ServerClient::new(&url).unwrap(),
        Arc::new(DummyBackend),
        fast_config(&url),
    );
    let cancel = CancellationToken::new();

    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(&cancel).await })
    };
    wait_for_submissions(&mock, 2).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    let submissions = mock.submissions.lock().unwrap();
    assert_eq!(submissions[0].task_id, "kitchen::ep_001_w0");
    assert_eq!(submissions[0].vlm_json["transitions"], json!([8]));
    assert_eq!(submissions[1].vlm_json["instructions"], json!(["Single task"]));
    assert!(submissions.iter().all(|s| s.latency_s.is_some() && s.meta.is_some()));
}

#[tokio::test]
async fn exhausted_local_retries_submit_empty_answer() {
    let (mock, url) = start_mock(vec![]).await;
    let backend = Arc::new(SilentBackend::default());
    let worker = Worker::new(
        ServerClient::new(&url).unwrap(),
        backend.clone(),
        fast_config(&url),
    );

    let status = worker
        .process(job(0, vec![placeholder_frame().unwrap()]))
        .await
        .unwrap();

    assert_eq!(status, SubmitStatus::RetryTriggered);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(mock.submissions.lock().unwrap()[0].vlm_json, json!({}));
}

#[tokio::test]
async fn undecodable_frames_are_replaced_before_inference() {
    let (_mock, url) = start_mock(vec![]).await;
    let backend = Arc::new(RecordingBackend::default());
    let worker = Worker::new(
        ServerClient::new(&url).unwrap(),
        backend.clone(),
        fast_config(&url),
    );

    let status = worker
        .process(job(0, vec![String::new(), "not-a-png".into()]))
        .await
        .unwrap();

    assert_eq!(status, SubmitStatus::Received);
    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|img| !img.is_empty() && img != "not-a-png"));
}

#[tokio::test]
async fn unreachable_server_backs_off_and_stops_on_cancel() {
    // Nothing listens on the discard port.
    let url = "http://127.0.0.1:9";
    let worker = Worker::new(
        ServerClient::new(url).unwrap(),
        Arc::new(DummyBackend),
        fast_config(url),
    );
    let cancel = CancellationToken::new();

    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

//! Worker protocol: job pulls, result submissions, stats.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json, post_raw};
use serde_json::json;
use v2t_core::job::{Job, JobMeta};
use v2t_api::state::AppState;

fn job(window_id: usize) -> Job {
    Job::new(
        JobMeta {
            subset: "kitchen".into(),
            sample_id: "ep_001".into(),
            window_id,
            frame_ids: vec![0, 10, 20],
        },
        vec!["aGVsbG8=".into(); 3],
    )
}

async fn seed_inflight(state: &AppState, window_id: usize) -> Job {
    state.dispatcher.enqueue(job(window_id)).await;
    state.dispatcher.dequeue().await.unwrap()
}

fn submission(job: &Job, vlm_json: serde_json::Value) -> serde_json::Value {
    json!({
        "task_id": job.task_id,
        "vlm_json": vlm_json,
        "meta": job.meta,
        "latency_s": 0.42,
    })
}

// ---------------------------------------------------------------------------
// GET /get_job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_job_reports_empty_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = common::build_test_app(dir.path());

    let response = get(app, "/get_job").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "empty"}));
}

#[tokio::test]
async fn get_job_hands_out_oldest_job() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = common::build_test_app(dir.path());
    state.dispatcher.enqueue(job(0)).await;
    state.dispatcher.enqueue(job(1)).await;

    let json = body_json(get(app, "/get_job").await).await;

    assert_eq!(json["status"], "ok");
    assert_eq!(json["data"]["task_id"], "kitchen::ep_001_w0");
    assert_eq!(json["data"]["meta"]["frame_ids"], json!([0, 10, 20]));
    assert_eq!(json["data"]["images"].as_array().unwrap().len(), 3);
    assert_eq!(state.dispatcher.stats().await.inflight, 1);
}

// ---------------------------------------------------------------------------
// POST /submit_result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_result_records_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = common::build_test_app(dir.path());
    let job = seed_inflight(&state, 0).await;

    let response = post_json(
        app,
        "/submit_result",
        submission(&job, json!({"transitions": [1], "instructions": ["Pick cup", "Place cup"]})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "received"}));
    assert!(state.dispatcher.is_drained().await);
    let log = state.store.load_window_records("kitchen", "ep_001").await.unwrap();
    assert_eq!(log.results[&0].instructions, vec!["Pick cup", "Place cup"]);
}

#[tokio::test]
async fn empty_answer_triggers_retry() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = common::build_test_app(dir.path());
    let job = seed_inflight(&state, 0).await;

    let response = post_json(app, "/submit_result", submission(&job, json!({}))).await;

    assert_eq!(body_json(response).await, json!({"status": "retry_triggered"}));
    let stats = state.dispatcher.stats().await;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.retrying, 1);
}

#[tokio::test]
async fn missing_vlm_json_triggers_retry() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = common::build_test_app(dir.path());
    let job = seed_inflight(&state, 0).await;

    let response = post_json(app, "/submit_result", json!({"task_id": job.task_id})).await;

    assert_eq!(body_json(response).await, json!({"status": "retry_triggered"}));
}

#[tokio::test]
async fn mismatched_meta_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = common::build_test_app(dir.path());

    let response = post_json(
        app,
        "/submit_result",
        json!({
            "task_id": "kitchen::ep_001_w7",
            "vlm_json": {"instructions": ["Pick cup"]},
            "meta": {"subset": "kitchen", "sample_id": "ep_001", "window_id": 3, "frame_ids": []},
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = common::build_test_app(dir.path());

    let response = post_raw(app, "/submit_result", "{not json".to_string()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// GET /stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_reports_queue_and_progress() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = common::build_test_app(dir.path());
    state.progress.init(10, 4);
    seed_inflight(&state, 0).await;
    state.dispatcher.enqueue(job(1)).await;

    let json = body_json(get(app, "/stats").await).await;

    assert_eq!(json["pending"], 1);
    assert_eq!(json["inflight"], 1);
    assert_eq!(json["abandoned"], 0);
    assert_eq!(json["progress"]["done"], 4);
    assert_eq!(json["progress"]["total"], 10);
}

use std::path::Path;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use v2t_api::config::ServerConfig;
use v2t_api::router::build_app_router;
use v2t_api::state::AppState;
use v2t_pipeline::PipelineConfig;

/// Build a test `ServerConfig` writing its run under `run_base`.
pub fn test_config(run_base: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        datasets: Vec::new(),
        run_base: run_base.to_path_buf(),
        run_id: "test".to_string(),
        pipeline: PipelineConfig {
            max_retries: 1,
            ..PipelineConfig::default()
        },
    }
}

/// Build the application state and the full router (same middleware stack
/// as production). The state is returned so tests can seed the queue.
pub fn build_test_app(run_base: &Path) -> (AppState, Router) {
    let state = AppState::new(test_config(run_base));
    let app = build_app_router(state.clone());
    (state, app)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

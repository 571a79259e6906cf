pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Worker-facing routes, mounted at the root.
///
/// ```text
/// GET  /get_job         pull the next job ({"status":"empty"} when idle)
/// POST /submit_result   report a window answer (or {} to request a retry)
/// GET  /stats           queue and progress counters
/// ```
pub fn worker_routes() -> Router<AppState> {
    Router::new()
        .route("/get_job", get(handlers::jobs::get_job))
        .route("/submit_result", post(handlers::jobs::submit_result))
        .route("/stats", get(handlers::jobs::stats))
}

use std::sync::Arc;

use v2t_pipeline::{Dispatcher, Progress, ResultIntake};
use v2t_store::{RunStore, SampleLocks};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Job queue shared with the orchestrator.
    pub dispatcher: Arc<Dispatcher>,
    /// Result persistence for `POST /submit_result`.
    pub intake: ResultIntake,
    /// Run directory layout.
    pub store: RunStore,
    /// Per-sample locks shared by intake and finalize.
    pub locks: SampleLocks,
    /// Run-wide completion counters.
    pub progress: Arc<Progress>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            config.pipeline.max_queue,
            config.pipeline.max_retries,
            config.pipeline.inflight_timeout,
        ));
        let store = RunStore::new(config.run_base.clone(), config.run_id.clone());
        let locks = SampleLocks::new();
        let intake = ResultIntake::new(dispatcher.clone(), store.clone(), locks.clone());

        Self {
            dispatcher,
            intake,
            store,
            locks,
            progress: Arc::new(Progress::new()),
            config: Arc::new(config),
        }
    }
}

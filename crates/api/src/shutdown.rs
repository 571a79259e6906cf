//! Post-shutdown cleanup of background tasks.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Grace period for the orchestrator after cancellation.
pub const ORCHESTRATOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a background task ended during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStop {
    Stopped,
    /// Panicked or was aborted.
    Failed,
    /// Still running when the grace period ran out.
    TimedOut,
}

/// Wait up to `grace` for an already-cancelled task and log how it ended.
pub async fn join_task(name: &str, handle: JoinHandle<()>, grace: Duration) -> TaskStop {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => {
            tracing::info!(task = name, "Background task stopped");
            TaskStop::Stopped
        }
        Ok(Err(e)) => {
            tracing::warn!(task = name, error = %e, "Background task failed");
            TaskStop::Failed
        }
        Err(_) => {
            tracing::warn!(
                task = name,
                timeout_secs = grace.as_secs_f64(),
                "Background task did not stop in time",
            );
            TaskStop::TimedOut
        }
    }
}

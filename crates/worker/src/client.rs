//! HTTP client for the dispatch server's worker protocol.

use std::time::Duration;

use v2t_core::job::{JobPoll, ResultSubmission, SubmitStatus};

use crate::error::WorkerError;

/// Timeout for a single poll or submit request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for `GET /get_job` and `POST /submit_result`.
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ServerClient {
    pub fn new(base_url: &str) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask for the next job.
    pub async fn poll_job(&self) -> Result<JobPoll, WorkerError> {
        let response = self
            .client
            .get(format!("{}/get_job", self.base_url))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Report the answer (or `{}` for a retry) for one job.
    pub async fn submit(&self, submission: &ResultSubmission) -> Result<SubmitStatus, WorkerError> {
        let response = self
            .client
            .post(format!("{}/submit_result", self.base_url))
            .json(submission)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, WorkerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WorkerError::ServerError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WorkerError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

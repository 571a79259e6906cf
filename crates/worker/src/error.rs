/// Errors from talking to the dispatch server or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP request itself failed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("server error ({status}): {body}")]
    ServerError { status: u16, body: String },
}

impl WorkerError {
    /// Whether the server could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, WorkerError::Request(e) if e.is_connect() || e.is_timeout())
    }
}

/// Errors from a VLM backend call.
#[derive(Debug, thiserror::Error)]
pub enum VlmError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The inference endpoint returned a non-2xx status code.
    #[error("inference API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The response body was not the JSON we expected.
    #[error("failed to decode inference response: {0}")]
    Decode(String),

    /// Encoding a frame payload failed.
    #[error("frame encoding failed: {0}")]
    Frame(String),

    #[error("unknown backend '{0}' (available: dummy, remote_api)")]
    UnknownBackend(String),
}

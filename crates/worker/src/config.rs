use std::collections::HashMap;
use std::time::Duration;

use v2t_vlm::remote::{DEFAULT_REMOTE_API_TIMEOUT, DEFAULT_REMOTE_API_URL};
use v2t_vlm::{BackendKind, RemoteApiConfig};

use crate::backoff::BackoffConfig;
use crate::error::WorkerError;

/// Default dispatch server address.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8099";

/// Default number of inference attempts per job before giving up locally.
pub const DEFAULT_MAX_LOCAL_RETRIES: u32 = 2;

/// Pause after the server reports an empty queue.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(500);

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server_url: String,
    pub backend: BackendKind,
    pub remote: RemoteApiConfig,
    /// Inference attempts per job; at least one attempt is always made.
    pub max_local_retries: u32,
    pub idle_delay: Duration,
    pub backoff: BackoffConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            backend: BackendKind::Dummy,
            remote: RemoteApiConfig::default(),
            max_local_retries: DEFAULT_MAX_LOCAL_RETRIES,
            idle_delay: DEFAULT_IDLE_DELAY,
            backoff: BackoffConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                       |
    /// |----------------------|-------------------------------|
    /// | `SERVER_URL`         | `http://127.0.0.1:8099`       |
    /// | `BACKEND`            | `dummy` (`dummy`, `remote_api`) |
    /// | `REMOTE_API_URL`     | `http://127.0.0.1:8080/infer` |
    /// | `REMOTE_API_KEY`     | (empty)                       |
    /// | `REMOTE_API_TIMEOUT` | `60`                          |
    /// | `REMOTE_API_HEADERS` | (empty, JSON object)          |
    /// | `MAX_LOCAL_RETRIES`  | `2`                           |
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = match get("BACKEND") {
            Some(name) => name
                .parse()
                .map_err(|e: v2t_vlm::VlmError| WorkerError::Config(e.to_string()))?,
            None => BackendKind::Dummy,
        };

        let timeout_secs: u64 = match get("REMOTE_API_TIMEOUT") {
            Some(raw) => raw.parse().map_err(|_| {
                WorkerError::Config(format!("REMOTE_API_TIMEOUT has an invalid value '{raw}'"))
            })?,
            None => DEFAULT_REMOTE_API_TIMEOUT.as_secs(),
        };

        let max_local_retries = match get("MAX_LOCAL_RETRIES") {
            Some(raw) => raw.parse().map_err(|_| {
                WorkerError::Config(format!("MAX_LOCAL_RETRIES has an invalid value '{raw}'"))
            })?,
            None => DEFAULT_MAX_LOCAL_RETRIES,
        };

        let headers = match get("REMOTE_API_HEADERS") {
            Some(raw) => parse_headers(&raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            server_url: get("SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            backend,
            remote: RemoteApiConfig {
                url: get("REMOTE_API_URL").unwrap_or_else(|| DEFAULT_REMOTE_API_URL.to_string()),
                api_key: get("REMOTE_API_KEY").unwrap_or_default(),
                headers,
                timeout: Duration::from_secs(timeout_secs),
            },
            max_local_retries,
            ..Self::default()
        })
    }
}

/// `REMOTE_API_HEADERS` must be a JSON object; non-string values are
/// sent in their JSON text form.
fn parse_headers(raw: &str) -> Result<HashMap<String, String>, WorkerError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| WorkerError::Config(format!("REMOTE_API_HEADERS is not valid JSON: {e}")))?;
    let serde_json::Value::Object(map) = value else {
        return Err(WorkerError::Config(
            "REMOTE_API_HEADERS must be a JSON object".into(),
        ));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

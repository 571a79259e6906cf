//! HTTP client for a remote inference endpoint.
//!
//! Sends `POST <url>` with `{prompt, images_b64_png}` and accepts any of
//! three response shapes:
//!
//! - the answer object itself (`{transitions, instructions, thought?}`),
//! - a wrapper `{vlm_json: {...}}`,
//! - raw model text `{text: "..."}`, from which a JSON object is extracted.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use v2t_core::job::VlmAnswer;

use crate::backend::VlmBackend;
use crate::error::VlmError;
use crate::extract::extract_json;

/// Default inference endpoint.
pub const DEFAULT_REMOTE_API_URL: &str = "http://127.0.0.1:8080/infer";

/// Default request timeout.
pub const DEFAULT_REMOTE_API_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`RemoteApiBackend`].
#[derive(Debug, Clone)]
pub struct RemoteApiConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <key>` unless `headers` already
    /// carries an authorization header.
    pub api_key: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REMOTE_API_URL.to_string(),
            api_key: String::new(),
            headers: HashMap::new(),
            timeout: DEFAULT_REMOTE_API_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct InferRequest<'a> {
    prompt: &'a str,
    images_b64_png: &'a [String],
}

/// Backend that forwards frames to a remote inference service.
pub struct RemoteApiBackend {
    client: reqwest::Client,
    url: String,
}

impl RemoteApiBackend {
    pub fn new(config: RemoteApiConfig) -> Result<Self, VlmError> {
        let headers = build_headers(&config)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            url: config.url,
        })
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`VlmError::ApiError`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, VlmError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, VlmError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| VlmError::Decode(e.to_string()))
    }
}

#[async_trait]
impl VlmBackend for RemoteApiBackend {
    fn name(&self) -> &'static str {
        "remote_api"
    }

    async fn infer(&self, images: &[String], prompt: &str) -> Result<Option<VlmAnswer>, VlmError> {
        let body = InferRequest {
            prompt,
            images_b64_png: images,
        };
        let response = self.client.post(&self.url).json(&body).send().await?;
        let data = Self::parse_response(response).await?;
        Ok(answer_from_response(&data))
    }
}

/// Build the default header map: configured extras plus the bearer key.
fn build_headers(config: &RemoteApiConfig) -> Result<HeaderMap, VlmError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| VlmError::Decode(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| VlmError::Decode(format!("invalid value for header '{name}': {e}")))?;
        headers.insert(name, value);
    }

    if !config.api_key.is_empty() && !headers.contains_key(AUTHORIZATION) {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| VlmError::Decode(format!("invalid API key: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Interpret one of the accepted response shapes.
fn answer_from_response(data: &Value) -> Option<VlmAnswer> {
    let obj = data.as_object()?;

    if obj.contains_key("transitions") || obj.contains_key("instructions") {
        return VlmAnswer::from_value(data);
    }
    if let Some(inner) = obj.get("vlm_json").filter(|v| v.is_object()) {
        return VlmAnswer::from_value(inner);
    }
    if let Some(Value::String(text)) = obj.get("text") {
        return extract_json(text).and_then(|v| VlmAnswer::from_value(&v));
    }

    tracing::warn!("Inference endpoint returned an unexpected response shape");
    None
}

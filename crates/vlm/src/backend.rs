use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use v2t_core::job::VlmAnswer;

use crate::dummy::DummyBackend;
use crate::error::VlmError;
use crate::remote::{RemoteApiBackend, RemoteApiConfig};

/// A capability that turns an ordered window of frames into a
/// boundary/label answer.
#[async_trait]
pub trait VlmBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Called once before the worker starts pulling jobs.
    async fn warmup(&self) -> Result<(), VlmError> {
        Ok(())
    }

    /// Run inference over base64-encoded PNG frames.
    ///
    /// `Ok(None)` means the backend produced no usable answer; the caller
    /// may try again or report an empty result.
    async fn infer(&self, images: &[String], prompt: &str) -> Result<Option<VlmAnswer>, VlmError>;
}

/// Available backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Dummy,
    RemoteApi,
}

impl FromStr for BackendKind {
    type Err = VlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dummy" => Ok(BackendKind::Dummy),
            "remote_api" => Ok(BackendKind::RemoteApi),
            other => Err(VlmError::UnknownBackend(other.to_string())),
        }
    }
}

/// Build the configured backend.
pub fn create_backend(
    kind: BackendKind,
    remote: &RemoteApiConfig,
) -> Result<Arc<dyn VlmBackend>, VlmError> {
    match kind {
        BackendKind::Dummy => Ok(Arc::new(DummyBackend)),
        BackendKind::RemoteApi => Ok(Arc::new(RemoteApiBackend::new(remote.clone())?)),
    }
}

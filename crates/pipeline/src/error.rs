use v2t_core::error::CoreError;
use v2t_store::StoreError;

use crate::frames::FrameSourceError;

/// Errors surfaced by the dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Frames(#[from] FrameSourceError),
}

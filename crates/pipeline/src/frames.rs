//! Video access seam: probe a sample's video and pull encoded frames.

use std::path::Path;

use async_trait::async_trait;
use v2t_core::types::FrameId;

/// Default encoded frame width.
pub const DEFAULT_TARGET_WIDTH: u32 = 720;

/// Default encoded frame height.
pub const DEFAULT_TARGET_HEIGHT: u32 = 480;

/// Highest PNG compression level.
pub const MAX_PNG_COMPRESSION: u8 = 9;

/// Error type for video probing and frame extraction.
#[derive(Debug, thiserror::Error)]
pub enum FrameSourceError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

/// Frame rate and length of a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub frame_count: usize,
}

/// How extracted frames are encoded for transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoding {
    pub width: u32,
    pub height: u32,
    /// PNG compression level, 0 (none) to 9.
    pub png_compression: u8,
}

impl Default for FrameEncoding {
    fn default() -> Self {
        Self {
            width: DEFAULT_TARGET_WIDTH,
            height: DEFAULT_TARGET_HEIGHT,
            png_compression: 0,
        }
    }
}

/// Source of video metadata and encoded frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Frame rate and frame count of the video.
    async fn open(&self, video: &Path) -> Result<VideoInfo, FrameSourceError>;

    /// Base64 PNGs for `frame_ids`, in the same order and with the same
    /// length. Frames that cannot be decoded are returned as empty strings.
    async fn extract_frames(
        &self,
        video: &Path,
        frame_ids: &[FrameId],
    ) -> Result<Vec<String>, FrameSourceError>;
}

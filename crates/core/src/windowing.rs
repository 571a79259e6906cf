//! Window planning: split a video into overlapping, sparsely sampled spans.
//!
//! A window covers `window_sec` seconds of video, windows start every
//! `step_sec` seconds, and each window is represented by
//! `frames_per_window` evenly spaced frame indices. Planning is a pure
//! function of `(fps, frame_count, config)`, so window ids are stable
//! across restarts and can be used to resume from the result log.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{FrameId, WindowId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Frame rate assumed when the container reports a missing or bogus value.
pub const DEFAULT_FPS: f64 = 30.0;

/// Frame rates at or below this are treated as unknown.
const MIN_VALID_FPS: f64 = 1e-6;

/// Default window duration in seconds.
pub const DEFAULT_WINDOW_SEC: f64 = 16.0;

/// Default distance between window starts in seconds.
pub const DEFAULT_STEP_SEC: f64 = 8.0;

/// Default number of sampled frames per window.
pub const DEFAULT_FRAMES_PER_WINDOW: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Windowing parameters shared by the planner and the reconstructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowingConfig {
    pub window_sec: f64,
    pub step_sec: f64,
    pub frames_per_window: usize,
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            window_sec: DEFAULT_WINDOW_SEC,
            step_sec: DEFAULT_STEP_SEC,
            frames_per_window: DEFAULT_FRAMES_PER_WINDOW,
        }
    }
}

impl WindowingConfig {
    /// Reject parameters that would make planning meaningless.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.window_sec.is_finite() && self.window_sec > 0.0) {
            return Err(CoreError::Validation(format!(
                "window_sec must be a positive number, got {}",
                self.window_sec
            )));
        }
        if !(self.step_sec.is_finite() && self.step_sec > 0.0) {
            return Err(CoreError::Validation(format!(
                "step_sec must be a positive number, got {}",
                self.step_sec
            )));
        }
        if self.frames_per_window == 0 {
            return Err(CoreError::Validation(
                "frames_per_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One span of a sample's video submitted as a single unit of inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub window_id: WindowId,
    pub start_frame: FrameId,
    /// Inclusive.
    pub end_frame: FrameId,
    pub frame_ids: Vec<FrameId>,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Replace a missing, non-finite or near-zero frame rate with [`DEFAULT_FPS`].
pub fn sanitize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > MIN_VALID_FPS {
        fps
    } else {
        DEFAULT_FPS
    }
}

/// Plan the ordered window sequence for a video.
///
/// The first window is always emitted, even when the whole video is
/// shorter than one window. Later windows are dropped (and planning stops)
/// once a window would span less than half the nominal window length.
pub fn build_windows(fps: f64, frame_count: usize, config: &WindowingConfig) -> Vec<Window> {
    let fps = sanitize_fps(fps);
    let win_len = seconds_to_frames(config.window_sec, fps);
    let step = seconds_to_frames(config.step_sec, fps);

    let mut windows = Vec::new();
    let mut start = 0usize;
    let mut window_id: WindowId = 0;

    while start < frame_count {
        let end = (frame_count - 1).min(start + win_len - 1);
        if end - start < win_len / 2 && window_id > 0 {
            break;
        }
        windows.push(Window {
            window_id,
            start_frame: start,
            end_frame: end,
            frame_ids: sample_frame_ids(start, end, config.frames_per_window, frame_count),
        });
        window_id += 1;
        start += step;
    }

    windows
}

/// `round(seconds * fps)`, never less than one frame.
fn seconds_to_frames(seconds: f64, fps: f64) -> usize {
    let frames = (seconds * fps).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}

/// `count` indices linearly spaced over `[start, end]`, rounded to the
/// nearest integer (halves round up) and clipped to the last frame of the
/// video.
///
/// Computed in integer arithmetic so the result is exact; the first
/// index is always `start` and (for `count > 1`) the last is `end`.
fn sample_frame_ids(start: FrameId, end: FrameId, count: usize, frame_count: usize) -> Vec<FrameId> {
    let last = frame_count.saturating_sub(1);
    if count == 1 {
        return vec![start.min(last)];
    }
    let span = end - start;
    let denom = count - 1;
    (0..count)
        .map(|i| (start + (2 * i * span + denom) / (2 * denom)).min(last))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

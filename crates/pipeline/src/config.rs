use std::time::Duration;

use v2t_core::error::CoreError;
use v2t_core::queue::{DEFAULT_INFLIGHT_TIMEOUT, DEFAULT_MAX_RETRIES};
use v2t_core::windowing::WindowingConfig;

use crate::catalog::VideoLocator;
use crate::frames::{FrameEncoding, MAX_PNG_COMPRESSION};

/// Default bound on pending jobs.
pub const DEFAULT_MAX_QUEUE: usize = 32;

/// Default number of jobs created per planning pass.
pub const DEFAULT_MAX_JOBS_PER_PASS: usize = 21;

/// Default orchestrator tick (timeout sweeps and re-checks).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Tunables of the dispatch engine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub windowing: WindowingConfig,
    pub encoding: FrameEncoding,
    pub video: VideoLocator,
    /// The producer stops creating jobs at this many pending jobs.
    pub max_queue: usize,
    pub max_jobs_per_pass: usize,
    pub max_retries: u32,
    pub inflight_timeout: Duration,
    pub tick_interval: Duration,
    pub auto_exit_after_all_done: bool,
    /// Displayed progress total; 0 means the discovered sample count.
    pub progress_total_override: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windowing: WindowingConfig::default(),
            encoding: FrameEncoding::default(),
            video: VideoLocator::default(),
            max_queue: DEFAULT_MAX_QUEUE,
            max_jobs_per_pass: DEFAULT_MAX_JOBS_PER_PASS,
            max_retries: DEFAULT_MAX_RETRIES,
            inflight_timeout: DEFAULT_INFLIGHT_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            auto_exit_after_all_done: false,
            progress_total_override: 0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.windowing.validate()?;
        if self.max_queue == 0 {
            return Err(CoreError::Validation("max_queue must be at least 1".into()));
        }
        if self.max_jobs_per_pass == 0 {
            return Err(CoreError::Validation(
                "max_jobs_per_pass must be at least 1".into(),
            ));
        }
        if self.encoding.png_compression > MAX_PNG_COMPRESSION {
            return Err(CoreError::Validation(format!(
                "png_compression must be 0-{MAX_PNG_COMPRESSION}, got {}",
                self.encoding.png_compression
            )));
        }
        if self.encoding.width == 0 || self.encoding.height == 0 {
            return Err(CoreError::Validation(
                "target frame size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

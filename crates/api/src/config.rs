use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use v2t_core::error::CoreError;
use v2t_core::queue::{DEFAULT_INFLIGHT_TIMEOUT, DEFAULT_MAX_RETRIES};
use v2t_core::windowing::{DEFAULT_FRAMES_PER_WINDOW, DEFAULT_STEP_SEC, DEFAULT_WINDOW_SEC};
use v2t_pipeline::catalog::{parse_datasets, DEFAULT_VIDEO_EXTENSION, DEFAULT_VIDEO_PREFIX};
use v2t_pipeline::config::{DEFAULT_MAX_JOBS_PER_PASS, DEFAULT_MAX_QUEUE};
use v2t_pipeline::frames::{DEFAULT_TARGET_HEIGHT, DEFAULT_TARGET_WIDTH};
use v2t_pipeline::{DatasetSpec, PipelineConfig};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local run against `./runs`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8099`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// Datasets processed in order.
    pub datasets: Vec<DatasetSpec>,
    /// Output base directory (default: `./runs`).
    pub run_base: PathBuf,
    /// Run identifier (default: `default`).
    pub run_id: String,
    /// Dispatch engine tunables.
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default       |
    /// |----------------------------|---------------|
    /// | `HOST`                     | `0.0.0.0`     |
    /// | `PORT`                     | `8099`        |
    /// | `REQUEST_TIMEOUT_SECS`     | `60`          |
    /// | `DATASETS`                 | (empty)       |
    /// | `RUN_BASE`                 | `./runs`      |
    /// | `RUN_ID`                   | `default`     |
    /// | `MAX_QUEUE`                | `32`          |
    /// | `INFLIGHT_TIMEOUT_SECS`    | `300`         |
    /// | `MAX_RETRIES_PER_JOB`      | `5`           |
    /// | `MAX_JOBS_PER_PASS`        | `21`          |
    /// | `AUTO_EXIT_AFTER_ALL_DONE` | `false`       |
    /// | `PROGRESS_TOTAL_OVERRIDE`  | `0`           |
    /// | `WINDOW_SEC`               | `16.0`        |
    /// | `STEP_SEC`                 | `8.0`         |
    /// | `FRAMES_PER_WINDOW`        | `16`          |
    /// | `TARGET_WIDTH`             | `720`         |
    /// | `TARGET_HEIGHT`            | `480`         |
    /// | `PNG_COMPRESSION`          | `0`           |
    /// | `VIDEO_PREFIX`             | `Frame_`      |
    /// | `VIDEO_EXTENSION`          | `mp4`         |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let vars = Vars(&lookup);

        let mut pipeline = PipelineConfig::default();
        pipeline.max_queue = vars.parse("MAX_QUEUE", DEFAULT_MAX_QUEUE)?;
        pipeline.inflight_timeout = Duration::from_secs(
            vars.parse("INFLIGHT_TIMEOUT_SECS", DEFAULT_INFLIGHT_TIMEOUT.as_secs())?,
        );
        pipeline.max_retries = vars.parse("MAX_RETRIES_PER_JOB", DEFAULT_MAX_RETRIES)?;
        pipeline.max_jobs_per_pass = vars.parse("MAX_JOBS_PER_PASS", DEFAULT_MAX_JOBS_PER_PASS)?;
        pipeline.auto_exit_after_all_done = vars.flag("AUTO_EXIT_AFTER_ALL_DONE")?;
        pipeline.progress_total_override = vars.parse("PROGRESS_TOTAL_OVERRIDE", 0)?;
        pipeline.windowing.window_sec = vars.parse("WINDOW_SEC", DEFAULT_WINDOW_SEC)?;
        pipeline.windowing.step_sec = vars.parse("STEP_SEC", DEFAULT_STEP_SEC)?;
        pipeline.windowing.frames_per_window =
            vars.parse("FRAMES_PER_WINDOW", DEFAULT_FRAMES_PER_WINDOW)?;
        pipeline.encoding.width = vars.parse("TARGET_WIDTH", DEFAULT_TARGET_WIDTH)?;
        pipeline.encoding.height = vars.parse("TARGET_HEIGHT", DEFAULT_TARGET_HEIGHT)?;
        pipeline.encoding.png_compression = vars.parse("PNG_COMPRESSION", 0)?;
        pipeline.video.prefix = vars.string("VIDEO_PREFIX", DEFAULT_VIDEO_PREFIX);
        pipeline.video.extension = vars.string("VIDEO_EXTENSION", DEFAULT_VIDEO_EXTENSION);
        pipeline.validate()?;

        let run_id = vars.string("RUN_ID", "default");
        v2t_core::types::validate_path_component("RUN_ID", &run_id)?;

        Ok(Self {
            host: vars.string("HOST", "0.0.0.0"),
            port: vars.parse("PORT", 8099)?,
            request_timeout_secs: vars.parse("REQUEST_TIMEOUT_SECS", 60)?,
            datasets: parse_datasets(&vars.string("DATASETS", ""))?,
            run_base: PathBuf::from(vars.string("RUN_BASE", "./runs")),
            run_id,
            pipeline,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, CoreError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| CoreError::Validation(format!("{key} has an invalid value '{raw}'"))),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, CoreError> {
        match self.get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("0" | "false" | "no" | "off") => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some(other) => Err(CoreError::Validation(format!(
                "{key} must be a boolean, got '{other}'"
            ))),
        }
    }
}

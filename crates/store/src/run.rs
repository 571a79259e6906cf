//! Run directory layout and the file operations on it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use v2t_core::job::WindowRecord;
use v2t_core::segments::SegmentArtifact;
use v2t_core::types::validate_path_component;

use crate::error::StoreError;
use crate::log::{decode_log, encode_record, LoadedLog};

/// Append-only result log, one JSON record per line.
pub const WINDOWS_LOG_FILE: &str = "windows.jsonl";

/// Final segment artifact.
pub const SEGMENTS_FILE: &str = "segments.json";

/// Empty sentinel written after the artifact is in place.
pub const DONE_MARKER_FILE: &str = ".DONE";

/// Suffix of the scratch file an artifact is written to before rename.
const TMP_SUFFIX: &str = ".tmp";

/// Paths of one sample's run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePaths {
    pub dir: PathBuf,
    pub windows_log: PathBuf,
    pub segments: PathBuf,
    pub done_marker: PathBuf,
}

/// Root of one run's persisted state.
#[derive(Debug, Clone)]
pub struct RunStore {
    base_dir: PathBuf,
    run_id: String,
}

impl RunStore {
    pub fn new(base_dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            run_id: run_id.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// `<base>/<subset>/<run_id>/samples`.
    pub fn samples_dir(&self, subset: &str) -> PathBuf {
        self.base_dir.join(subset).join(&self.run_id).join("samples")
    }

    /// Resolve a sample's paths, rejecting names that would escape the run
    /// directory.
    pub fn sample_paths(&self, subset: &str, sample_id: &str) -> Result<SamplePaths, StoreError> {
        validate_path_component("subset", subset)?;
        validate_path_component("sample_id", sample_id)?;

        let dir = self.samples_dir(subset).join(sample_id);
        Ok(SamplePaths {
            windows_log: dir.join(WINDOWS_LOG_FILE),
            segments: dir.join(SEGMENTS_FILE),
            done_marker: dir.join(DONE_MARKER_FILE),
            dir,
        })
    }

    // -----------------------------------------------------------------------
    // Result log
    // -----------------------------------------------------------------------

    /// Append one record to the sample's log with a single write.
    ///
    /// Callers hold the sample's lock from [`crate::SampleLocks`].
    pub async fn append_window_record(
        &self,
        subset: &str,
        sample_id: &str,
        record: &WindowRecord,
    ) -> Result<(), StoreError> {
        let paths = self.sample_paths(subset, sample_id)?;
        let line = encode_record(record)?;

        create_dir(&paths.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&paths.windows_log)
            .await
            .map_err(|e| StoreError::io(&paths.windows_log, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(&paths.windows_log, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&paths.windows_log, e))?;
        Ok(())
    }

    /// Load the sample's log with last-write-wins per window id.
    ///
    /// A missing log is an empty one.
    pub async fn load_window_records(
        &self,
        subset: &str,
        sample_id: &str,
    ) -> Result<LoadedLog, StoreError> {
        let paths = self.sample_paths(subset, sample_id)?;
        match tokio::fs::read(&paths.windows_log).await {
            Ok(bytes) => Ok(decode_log(&bytes, &paths.windows_log.to_string_lossy())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LoadedLog::default()),
            Err(e) => Err(StoreError::io(&paths.windows_log, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Artifact and done marker
    // -----------------------------------------------------------------------

    /// Write the pretty-printed artifact via a scratch file and rename, so
    /// readers never observe a partial file.
    pub async fn write_segments(
        &self,
        subset: &str,
        artifact: &SegmentArtifact,
    ) -> Result<PathBuf, StoreError> {
        let paths = self.sample_paths(subset, &artifact.sample_id)?;
        let body = serde_json::to_vec_pretty(artifact).map_err(|source| StoreError::Serialize {
            what: "segment artifact",
            source,
        })?;

        create_dir(&paths.dir).await?;
        let tmp = paths.dir.join(format!("{SEGMENTS_FILE}{TMP_SUFFIX}"));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &paths.segments)
            .await
            .map_err(|e| StoreError::io(&paths.segments, e))?;
        Ok(paths.segments)
    }

    pub async fn is_done(&self, subset: &str, sample_id: &str) -> Result<bool, StoreError> {
        let paths = self.sample_paths(subset, sample_id)?;
        tokio::fs::try_exists(&paths.done_marker)
            .await
            .map_err(|e| StoreError::io(&paths.done_marker, e))
    }

    /// Create the done marker. Returns `true` only for the call that
    /// actually created it.
    pub async fn mark_done(&self, subset: &str, sample_id: &str) -> Result<bool, StoreError> {
        let paths = self.sample_paths(subset, sample_id)?;
        create_dir(&paths.dir).await?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&paths.done_marker)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::io(&paths.done_marker, e)),
        }
    }
}

async fn create_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::io(dir, e))
}

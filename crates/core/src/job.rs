//! Job payloads exchanged with workers, and the parsed model answer.
//!
//! Everything that crosses the wire is parsed into these types at the
//! boundary. A worker's `vlm_json` is free-form model output, so
//! [`VlmAnswer::from_value`] is deliberately lenient about element types
//! but strict about shape: anything that is not a non-empty JSON object
//! is the retry signal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{validate_path_component, FrameId, WindowId};

/// Deterministic task id for one window of one sample.
///
/// Identity is what makes production idempotent: a window's job can be
/// recreated any number of times and always collides with itself.
pub fn task_id(subset: &str, sample_id: &str, window_id: WindowId) -> String {
    format!("{subset}::{sample_id}_w{window_id}")
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Metadata echoed back by the worker with its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    pub subset: String,
    pub sample_id: String,
    pub window_id: WindowId,
    pub frame_ids: Vec<FrameId>,
}

impl JobMeta {
    /// The task id this metadata belongs to.
    pub fn task_id(&self) -> String {
        task_id(&self.subset, &self.sample_id, self.window_id)
    }

    /// Check that subset and sample id are safe to use as path components.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_path_component("subset", &self.subset)?;
        validate_path_component("sample_id", &self.sample_id)
    }
}

/// One unit of dispatched work: the encoded frames of a single window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub task_id: String,
    /// Base64-encoded PNG frames, in `meta.frame_ids` order.
    pub images: Vec<String>,
    pub meta: JobMeta,
}

impl Job {
    pub fn new(meta: JobMeta, images: Vec<String>) -> Self {
        Self {
            task_id: meta.task_id(),
            images,
            meta,
        }
    }
}

// ---------------------------------------------------------------------------
// Model answer
// ---------------------------------------------------------------------------

/// Boundary/label answer for one window.
///
/// `transitions` are local indices into the window's frame list;
/// `instructions[i]` labels the span that starts at the `i`-th boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlmAnswer {
    #[serde(default)]
    pub transitions: Vec<i64>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

impl VlmAnswer {
    /// Parse a worker's raw `vlm_json`.
    ///
    /// Returns `None` for the retry signal: `null`, an empty object, a
    /// non-object, or an object whose `transitions`/`instructions` are
    /// present but not arrays. Individual transitions that are not
    /// integers (or integer-valued strings/floats) are dropped; non-string
    /// instructions are stringified.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.is_empty() {
            return None;
        }

        let transitions = match obj.get("transitions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().filter_map(transition_index).collect(),
            Some(_) => return None,
        };

        let instructions = match obj.get("instructions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(_) => return None,
        };

        let thought = obj
            .get("thought")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            transitions,
            instructions,
            thought,
        })
    }
}

/// Coerce one transition entry to an integer index.
fn transition_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// One line of a sample's append-only result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub task_id: String,
    pub window_id: WindowId,
    pub vlm_json: VlmAnswer,
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// Reply to a job pull: `{"status":"empty"}` or `{"status":"ok","data":Job}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum JobPoll {
    Empty,
    Ok(Job),
}

/// A worker's report for one job.
///
/// `vlm_json` stays raw until [`VlmAnswer::from_value`] decides whether it
/// is an answer or the retry signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub task_id: String,
    #[serde(default)]
    pub vlm_json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<JobMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlm_output: Option<String>,
}

/// Reply to a result submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitStatus {
    Received,
    RetryTriggered,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Encoding and decoding of the append-only `windows.jsonl` result log.
//!
//! Each line is one [`WindowRecord`]. Lines are independent: a torn or
//! hand-edited line costs only itself. When a window id appears more than
//! once, the last line wins.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use v2t_core::job::{VlmAnswer, WindowRecord};
use v2t_core::types::WindowId;

use crate::error::StoreError;

/// Result of decoding a log file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadedLog {
    /// Latest answer per window id.
    pub results: BTreeMap<WindowId, VlmAnswer>,
    /// Lines that were skipped because they could not be decoded.
    pub corrupt_lines: usize,
}

impl LoadedLog {
    pub fn window_ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.results.keys().copied()
    }
}

/// Serialize one record as a single newline-terminated line.
pub fn encode_record(record: &WindowRecord) -> Result<Vec<u8>, StoreError> {
    let mut line = serde_json::to_vec(record).map_err(|source| StoreError::Serialize {
        what: "window record",
        source,
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Loose on-disk shape; `vlm_json` goes through the same lenient parser
/// as worker submissions.
#[derive(Deserialize)]
struct RawRecord {
    window_id: WindowId,
    #[serde(default)]
    vlm_json: Value,
}

/// Decode a whole log, skipping (and logging) lines that do not parse.
pub fn decode_log(bytes: &[u8], source: &str) -> LoadedLog {
    let mut loaded = LoadedLog::default();

    for (line_no, line) in bytes.split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let parsed = serde_json::from_slice::<RawRecord>(line)
            .ok()
            .and_then(|raw| VlmAnswer::from_value(&raw.vlm_json).map(|a| (raw.window_id, a)));

        match parsed {
            Some((window_id, answer)) => {
                loaded.results.insert(window_id, answer);
            }
            None => {
                loaded.corrupt_lines += 1;
                tracing::warn!(
                    log = %source,
                    line = line_no + 1,
                    "Skipping corrupt result log line",
                );
            }
        }
    }

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(window_id: WindowId, label: &str) -> WindowRecord {
        WindowRecord {
            task_id: format!("ds::s_w{window_id}"),
            window_id,
            vlm_json: VlmAnswer {
                transitions: vec![],
                instructions: vec![label.to_string()],
                thought: None,
            },
        }
    }

    #[test]
    fn encoded_record_is_one_line() {
        let line = encode_record(&record(3, "a\nb")).unwrap();

        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn last_write_wins() {
        let mut bytes = encode_record(&record(0, "old")).unwrap();
        bytes.extend(encode_record(&record(1, "other")).unwrap());
        bytes.extend(encode_record(&record(0, "new")).unwrap());

        let loaded = decode_log(&bytes, "test");

        assert_eq!(loaded.results.len(), 2);
        assert_eq!(loaded.results[&0].instructions, vec!["new"]);
        assert_eq!(loaded.corrupt_lines, 0);
    }

    #[test]
    fn corrupt_and_truncated_lines_are_skipped() {
        let mut bytes = encode_record(&record(0, "kept")).unwrap();
        bytes.extend_from_slice(b"not json\n");
        bytes.extend_from_slice(b"{\"window_id\": 1, \"vlm_json\": {}}\n");
        bytes.extend_from_slice(b"\n   \n");
        bytes.extend_from_slice(b"{\"task_id\":\"ds::s_w2\",\"window_id\":2,\"vlm_j");

        let loaded = decode_log(&bytes, "test");

        assert_eq!(loaded.window_ids().collect::<Vec<_>>(), vec![0]);
        assert_eq!(loaded.corrupt_lines, 3);
    }
}

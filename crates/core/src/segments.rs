//! Segment reconstruction: merge overlapping per-window answers into one
//! timeline of labeled, non-overlapping segments.
//!
//! The procedure runs in four passes:
//!
//! 1. **Cut extraction.** Every valid transition of every recorded window
//!    becomes a [`CutCandidate`] at its global frame. Windows with the full
//!    frame count weight cuts by a Hanning taper, so boundaries seen near a
//!    window's center count more than ones seen near its edges.
//! 2. **Label votes.** Each window's boundaries split its sampled frames
//!    into spans; the `i`-th label votes for every sampled frame of the
//!    `i`-th span.
//! 3. **Clustering.** Sorted cuts closer than `cluster_gap` to the previous
//!    cut collapse into one weighted-average cut.
//! 4. **Assembly.** Consecutive cuts form intervals. Short intervals are
//!    dropped, and each survivor takes the most frequent vote in its core
//!    region.
//!
//! The result is a pure function of its inputs.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::job::VlmAnswer;
use crate::types::{FrameId, WindowId};
use crate::windowing::{sanitize_fps, Window};

/// Clustering distance, in seconds of video.
const CLUSTER_GAP_SEC: f64 = 2.5;

/// Shortest segment kept, in seconds of video.
const MIN_SEGMENT_SEC: f64 = 0.8;

/// Weight sums at or below this fall back to an unweighted mean.
const MIN_WEIGHT_SUM: f64 = 1e-9;

/// Label that never votes (compared case-insensitively, trimmed).
const UNKNOWN_LABEL: &str = "unknown";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A proposed boundary at a global frame with a confidence weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutCandidate {
    pub frame_id: FrameId,
    pub weight: f64,
}

/// One labeled span of the final timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub seg_id: usize,
    pub start_frame: FrameId,
    /// Exclusive.
    pub end_frame: FrameId,
    pub instruction: String,
    pub confidence: f64,
}

/// Final per-sample output, persisted as `segments.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentArtifact {
    pub sample_id: String,
    pub nframes: usize,
    pub segments: Vec<Segment>,
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

/// Rebuild the segment list for one sample from its recorded answers.
///
/// `results` is keyed by window id; windows without an entry contribute
/// nothing. `frames_per_window` selects the Hanning weighting for windows
/// that carry exactly that many frames.
pub fn build_segments(
    sample_id: &str,
    windows: &[Window],
    results: &BTreeMap<WindowId, VlmAnswer>,
    fps: f64,
    frame_count: usize,
    frames_per_window: usize,
) -> SegmentArtifact {
    let mut artifact = SegmentArtifact {
        sample_id: sample_id.to_string(),
        nframes: frame_count,
        segments: Vec::new(),
    };
    if frame_count == 0 {
        return artifact;
    }

    let fps = sanitize_fps(fps);
    let taper = hanning_interior(frames_per_window);

    let mut cuts = Vec::new();
    let mut votes = VoteTimeline::new(frame_count);

    for window in windows {
        let Some(answer) = results.get(&window.window_id) else {
            continue;
        };
        collect_cuts(window, answer, frames_per_window, &taper, &mut cuts);
        votes.collect(window, answer);
    }

    let cut_points = cluster_cuts(cuts, fps, frame_count);
    artifact.segments = assemble_segments(&cut_points, &votes, fps);
    artifact
}

/// Interior of a Hanning window of length `n + 2`: `n` strictly positive
/// weights peaking at the center.
fn hanning_interior(n: usize) -> Vec<f64> {
    let m = (n + 2) as f64;
    (1..=n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (m - 1.0)).cos())
        .collect()
}

/// Valid local transition indices of an answer, in answer order.
fn valid_transitions<'a>(answer: &'a VlmAnswer, len: usize) -> impl Iterator<Item = usize> + 'a {
    answer
        .transitions
        .iter()
        .filter_map(move |&t| usize::try_from(t).ok().filter(|&idx| idx < len))
}

fn collect_cuts(
    window: &Window,
    answer: &VlmAnswer,
    frames_per_window: usize,
    taper: &[f64],
    cuts: &mut Vec<CutCandidate>,
) {
    let len = window.frame_ids.len();
    for idx in valid_transitions(answer, len) {
        let weight = if len == frames_per_window {
            taper[idx]
        } else if idx.min(len - 1 - idx) > 2 {
            1.0
        } else {
            0.5
        };
        cuts.push(CutCandidate {
            frame_id: window.frame_ids[idx],
            weight,
        });
    }
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

/// Per-frame label votes, with labels interned in first-seen order.
struct VoteTimeline {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    frames: Vec<Vec<usize>>,
}

impl VoteTimeline {
    fn new(frame_count: usize) -> Self {
        Self {
            labels: Vec::new(),
            index: HashMap::new(),
            frames: vec![Vec::new(); frame_count],
        }
    }

    fn intern(&mut self, label: &str) -> usize {
        if let Some(&id) = self.index.get(label) {
            return id;
        }
        let id = self.labels.len();
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), id);
        id
    }

    fn collect(&mut self, window: &Window, answer: &VlmAnswer) {
        let len = window.frame_ids.len();
        if len == 0 {
            return;
        }

        let mut bounds: Vec<usize> = std::iter::once(0)
            .chain(valid_transitions(answer, len))
            .chain(std::iter::once(len))
            .collect();
        bounds.sort_unstable();
        bounds.dedup();

        for (span, label) in bounds.windows(2).zip(&answer.instructions) {
            let label = label.trim();
            if label.is_empty() || label.eq_ignore_ascii_case(UNKNOWN_LABEL) {
                continue;
            }
            let id = self.intern(label);
            for &frame in &window.frame_ids[span[0]..span[1]] {
                if let Some(slot) = self.frames.get_mut(frame) {
                    slot.push(id);
                }
            }
        }
    }

    /// Most frequent vote over `frames` (clipped to the timeline), ties
    /// going to the label encountered first.
    fn majority(&self, frames: std::ops::Range<usize>) -> Option<&str> {
        let end = frames.end.min(self.frames.len());
        let start = frames.start.min(end);

        // (label id, count) in first-encountered order.
        let mut tally: Vec<(usize, usize)> = Vec::new();
        for &id in self.frames[start..end].iter().flatten() {
            match tally.iter_mut().find(|(label, _)| *label == id) {
                Some((_, count)) => *count += 1,
                None => tally.push((id, 1)),
            }
        }

        let mut best: Option<(usize, usize)> = None;
        for (id, count) in tally {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((id, count));
            }
        }
        best.map(|(id, _)| self.labels[id].as_str())
    }
}

// ---------------------------------------------------------------------------
// Clustering and assembly
// ---------------------------------------------------------------------------

/// Collapse candidate cuts into sorted, unique cut points including the
/// sentinels `0` and `frame_count`.
fn cluster_cuts(mut cuts: Vec<CutCandidate>, fps: f64, frame_count: usize) -> Vec<usize> {
    let gap = (CLUSTER_GAP_SEC * fps).max(1.0);
    cuts.sort_by_key(|c| c.frame_id);

    let mut points = vec![0, frame_count];
    let mut cluster: Vec<CutCandidate> = Vec::new();

    for cut in cuts {
        if let Some(last) = cluster.last() {
            if ((cut.frame_id - last.frame_id) as f64) >= gap {
                points.push(cluster_center(&cluster));
                cluster.clear();
            }
        }
        cluster.push(cut);
    }
    if !cluster.is_empty() {
        points.push(cluster_center(&cluster));
    }

    points.sort_unstable();
    points.dedup();
    points
}

fn cluster_center(cluster: &[CutCandidate]) -> usize {
    let weight_sum: f64 = cluster.iter().map(|c| c.weight).sum();
    let center = if weight_sum > MIN_WEIGHT_SUM {
        cluster.iter().map(|c| c.frame_id as f64 * c.weight).sum::<f64>() / weight_sum
    } else {
        cluster.iter().map(|c| c.frame_id as f64).sum::<f64>() / cluster.len() as f64
    };
    center.round() as usize
}

fn assemble_segments(cut_points: &[usize], votes: &VoteTimeline, fps: f64) -> Vec<Segment> {
    let min_frames = ((MIN_SEGMENT_SEC * fps).round() as usize).max(1);
    let mut segments = Vec::new();

    for pair in cut_points.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let len = end - start;
        if len < min_frames {
            continue;
        }

        let margin = len / 5;
        let label = votes
            .majority(start + margin..end - margin + 1)
            .or_else(|| votes.majority(start..end));

        if let Some(label) = label {
            segments.push(Segment {
                seg_id: segments.len(),
                start_frame: start,
                end_frame: end,
                instruction: label.to_string(),
                confidence: 1.0,
            });
        }
    }

    segments
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

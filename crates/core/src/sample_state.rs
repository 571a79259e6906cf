//! Per-sample lifecycle and its transition table.
//!
//! The numeric ids are stable and appear in logs and `/stats` output.

use serde::Serialize;

use crate::error::CoreError;

/// Lifecycle of one sample within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    /// Window jobs still have to be produced.
    NeedsWindows,
    /// Every window is recorded or in flight; waiting for the last results.
    AwaitingFinalize,
    /// Segments persisted and done marker written.
    Done,
    /// At least one window was abandoned; the sample cannot be finalized
    /// in this process and is left without a done marker.
    Incomplete,
}

impl SampleStatus {
    pub fn id(self) -> i16 {
        match self {
            SampleStatus::NeedsWindows => 0,
            SampleStatus::AwaitingFinalize => 2,
            SampleStatus::Done => 3,
            SampleStatus::Incomplete => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleStatus::NeedsWindows => "NeedsWindows",
            SampleStatus::AwaitingFinalize => "AwaitingFinalize",
            SampleStatus::Done => "Done",
            SampleStatus::Incomplete => "Incomplete",
        }
    }

    /// Terminal states are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, SampleStatus::Done | SampleStatus::Incomplete)
    }

    /// States reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [SampleStatus] {
        use SampleStatus::*;
        match self {
            // A sample with nothing left to plan may finalize straight away
            // (resume after all results were already logged).
            NeedsWindows => &[AwaitingFinalize, Done, Incomplete],
            // Regresses when a recorded window turns out to be missing
            // from the reloaded log.
            AwaitingFinalize => &[Done, NeedsWindows, Incomplete],
            Done | Incomplete => &[],
        }
    }

    pub fn can_transition(self, to: SampleStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a descriptive error for invalid ones.
    pub fn validate_transition(self, to: SampleStatus) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition(format!(
                "{} ({}) -> {} ({})",
                self.name(),
                self.id(),
                to.name(),
                to.id()
            )))
        }
    }
}

impl std::fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

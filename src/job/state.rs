//! Job lifecycle states and the legal transitions between them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single job within one run
///
/// ```text
/// Pending ─▶ WaitingOnPrejobs ─▶ Running ⇄ Prompting
///    │              │               │          │
///    └──────────────┴─▶ Skipped     ├─▶ Finished
///                                   └─▶ Failed ◀┘
/// ```
///
/// Every non-terminal state may also move to `Failed` when the run is
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    WaitingOnPrejobs,
    Running,
    Prompting,
    Finished,
    Skipped,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Skipped | Self::Failed)
    }

    /// Running or suspended on a prompt
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Prompting)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, WaitingOnPrejobs | Skipped) => true,
            (WaitingOnPrejobs, Running | Skipped) => true,
            (Running, Prompting | Finished) => true,
            (Prompting, Running) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WaitingOnPrejobs => "waiting_on_prejobs",
            Self::Running => "running",
            Self::Prompting => "prompting",
            Self::Finished => "finished",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::JobState::*;
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Pending.can_transition_to(WaitingOnPrejobs));
        assert!(WaitingOnPrejobs.can_transition_to(Running));
        assert!(Running.can_transition_to(Prompting));
        assert!(Prompting.can_transition_to(Running));
        assert!(Running.can_transition_to(Finished));
    }

    #[test]
    fn test_skip_only_before_running() {
        assert!(Pending.can_transition_to(Skipped));
        assert!(WaitingOnPrejobs.can_transition_to(Skipped));
        assert!(!Running.can_transition_to(Skipped));
        assert!(!Prompting.can_transition_to(Skipped));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Finished, Skipped, Failed] {
            assert!(terminal.is_terminal());
            for next in [
                Pending,
                WaitingOnPrejobs,
                Running,
                Prompting,
                Finished,
                Skipped,
                Failed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_any_live_state_can_fail() {
        for live in [Pending, WaitingOnPrejobs, Running, Prompting] {
            assert!(live.can_transition_to(Failed));
        }
    }

    #[test]
    fn test_prompting_cannot_finish_directly() {
        assert!(!Prompting.can_transition_to(Finished));
        assert!(!Pending.can_transition_to(Running));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&WaitingOnPrejobs).unwrap();
        assert_eq!(json, "\"waiting_on_prejobs\"");
    }
}

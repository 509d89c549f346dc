//! The closed set of actions a client may record while offline.
//!
//! Anything outside [`ActionKind`] is rejected at enqueue time. Adding a
//! variant forces every `match` below to be revisited, so a new action can
//! never slip through validation without a decision-kind mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decision::DecisionKind;
use crate::error::CoreError;

/// Whitelisted offline action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    ClockIn,
    StartJob,
    PauseJob,
    ResumeJob,
    FinishJob,
    AddNote,
    FlagSimpleException,
}

impl ActionKind {
    /// Every whitelisted action, in declaration order.
    pub const ALL: [ActionKind; 7] = [
        ActionKind::ClockIn,
        ActionKind::StartJob,
        ActionKind::PauseJob,
        ActionKind::ResumeJob,
        ActionKind::FinishJob,
        ActionKind::AddNote,
        ActionKind::FlagSimpleException,
    ];

    /// Stable wire name, also used in the store.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::ClockIn => "clock-in",
            ActionKind::StartJob => "start-job",
            ActionKind::PauseJob => "pause-job",
            ActionKind::ResumeJob => "resume-job",
            ActionKind::FinishJob => "finish-job",
            ActionKind::AddNote => "add-note",
            ActionKind::FlagSimpleException => "flag-simple-exception",
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::ClockIn => "Clock in",
            ActionKind::StartJob => "Start job",
            ActionKind::PauseJob => "Pause job",
            ActionKind::ResumeJob => "Resume job",
            ActionKind::FinishJob => "Finish job",
            ActionKind::AddNote => "Add note",
            ActionKind::FlagSimpleException => "Flag exception",
        }
    }

    /// The decision kind recorded once this action is applied upstream.
    pub fn decision_kind(self) -> DecisionKind {
        match self {
            ActionKind::ClockIn => DecisionKind::TimesheetPunched,
            ActionKind::StartJob => DecisionKind::JobStarted,
            ActionKind::PauseJob => DecisionKind::JobPaused,
            ActionKind::ResumeJob => DecisionKind::JobResumed,
            ActionKind::FinishJob => DecisionKind::JobFinished,
            ActionKind::AddNote => DecisionKind::JobNoteAdded,
            ActionKind::FlagSimpleException => DecisionKind::ExceptionRecorded,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Whether `action` names a whitelisted offline action.
pub fn is_whitelisted(action: &str) -> bool {
    action.parse::<ActionKind>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_parses_from_its_wire_name() {
        for action in ActionKind::ALL {
            assert_eq!(action.as_str().parse::<ActionKind>().unwrap(), action);
        }
    }

    #[test]
    fn unknown_action_is_not_whitelisted() {
        assert!(!is_whitelisted("delete-job"));
        assert!(!is_whitelisted(""));
        assert!(!is_whitelisted("FINISH-JOB"));
    }

    #[test]
    fn serde_uses_wire_name() {
        let json = serde_json::to_string(&ActionKind::FlagSimpleException).unwrap();
        assert_eq!(json, "\"flag-simple-exception\"");
    }

    #[test]
    fn finish_job_records_job_finished() {
        assert_eq!(
            ActionKind::FinishJob.decision_kind(),
            DecisionKind::JobFinished
        );
    }
}

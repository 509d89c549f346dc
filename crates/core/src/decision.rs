//! Decision record taxonomy: kinds, origins, and severities.
//!
//! Severity is never supplied by a caller. It is derived from the kind via
//! [`DecisionKind::severity`], a fixed exhaustive table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// Entity family a decision kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionFamily {
    Job,
    Schedule,
    Worker,
    Payment,
    Customer,
    Closing,
    Permission,
    System,
    Access,
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

macro_rules! define_decision_kinds {
    (
        $(
            $family:ident {
                $( $variant:ident => ($wire:literal, $label:literal) ),+ $(,)?
            }
        )+
    ) => {
        /// Closed enumeration of business events recorded in the ledger.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum DecisionKind {
            $( $( $variant, )+ )+
        }

        impl DecisionKind {
            /// Every decision kind, grouped by family in declaration order.
            pub const ALL: &'static [DecisionKind] = &[
                $( $( DecisionKind::$variant, )+ )+
            ];

            /// Stable wire name. Part of the canonical record encoding.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $( DecisionKind::$variant => $wire, )+ )+
                }
            }

            /// Human-readable label for display.
            pub fn label(self) -> &'static str {
                match self {
                    $( $( DecisionKind::$variant => $label, )+ )+
                }
            }

            pub fn family(self) -> DecisionFamily {
                match self {
                    $( $( DecisionKind::$variant => DecisionFamily::$family, )+ )+
                }
            }
        }
    };
}

define_decision_kinds! {
    Job {
        JobCreated => ("job_created", "Job created"),
        JobEdited => ("job_edited", "Job edited"),
        JobStarted => ("job_started", "Job started"),
        JobPaused => ("job_paused", "Job paused"),
        JobResumed => ("job_resumed", "Job resumed"),
        JobFinished => ("job_finished", "Job finished"),
        JobDeleted => ("job_deleted", "Job deleted"),
        JobRestored => ("job_restored", "Job restored"),
        JobNoteAdded => ("job_note_added", "Job note added"),
        TonnageChanged => ("tonnage_changed", "Tonnage changed"),
    }
    Schedule {
        ScheduleCreated => ("schedule_created", "Schedule created"),
        ScheduleConfirmed => ("schedule_confirmed", "Schedule confirmed"),
        ScheduleCancelled => ("schedule_cancelled", "Schedule cancelled"),
        ScheduleEdited => ("schedule_edited", "Schedule edited"),
    }
    Worker {
        WorkerCreated => ("worker_created", "Worker created"),
        WorkerEdited => ("worker_edited", "Worker edited"),
        WorkerDeactivated => ("worker_deactivated", "Worker deactivated"),
        WorkerReactivated => ("worker_reactivated", "Worker reactivated"),
        TimesheetPunched => ("timesheet_punched", "Time clock punched"),
        TimesheetCorrected => ("timesheet_corrected", "Time clock corrected"),
        ExceptionRecorded => ("exception_recorded", "Exception recorded"),
    }
    Payment {
        PaymentMarked => ("payment_marked", "Payment marked"),
        PaymentEdited => ("payment_edited", "Payment edited"),
        PaymentCancelled => ("payment_cancelled", "Payment cancelled"),
    }
    Customer {
        CustomerCreated => ("customer_created", "Customer created"),
        CustomerEdited => ("customer_edited", "Customer edited"),
        CustomerDeactivated => ("customer_deactivated", "Customer deactivated"),
        CustomerReactivated => ("customer_reactivated", "Customer reactivated"),
    }
    Closing {
        ClosingGenerated => ("closing_generated", "Closing generated"),
        ClosingSent => ("closing_sent", "Closing sent"),
        ClosingConfigured => ("closing_configured", "Closing configured"),
    }
    Permission {
        RoleCreated => ("role_created", "Role created"),
        RoleEdited => ("role_edited", "Role edited"),
        RoleDeleted => ("role_deleted", "Role deleted"),
        PermissionsChanged => ("permissions_changed", "Permissions changed"),
    }
    System {
        SettingsChanged => ("settings_changed", "Settings changed"),
        UserCreated => ("user_created", "User created"),
        UserEdited => ("user_edited", "User edited"),
        UserDeactivated => ("user_deactivated", "User deactivated"),
        OfflineOperationQueued => ("offline_operation_queued", "Action recorded offline"),
        OfflineOperationExpired => ("offline_operation_expired", "Offline action expired"),
        OfflineSyncConflict => ("offline_sync_conflict", "Offline sync conflict"),
        OfflineConflictResolved => ("offline_conflict_resolved", "Offline conflict resolved"),
    }
    Access {
        LoginSucceeded => ("login_succeeded", "Login"),
        LogoutSucceeded => ("logout_succeeded", "Logout"),
        AccessDenied => ("access_denied", "Access denied"),
    }
}

impl DecisionKind {
    /// Fixed severity table.
    pub fn severity(self) -> Severity {
        use DecisionKind::*;
        use Severity::*;

        match self {
            JobCreated | JobEdited => Medium,
            JobStarted | JobPaused | JobResumed | JobNoteAdded => Low,
            JobFinished | JobRestored => High,
            JobDeleted | TonnageChanged => Critical,

            ScheduleCreated | ScheduleEdited => Low,
            ScheduleConfirmed | ScheduleCancelled => Medium,

            WorkerCreated | WorkerReactivated => High,
            WorkerEdited => Medium,
            WorkerDeactivated => Critical,
            TimesheetPunched => Low,
            TimesheetCorrected => High,
            ExceptionRecorded => Medium,

            PaymentMarked | PaymentEdited | PaymentCancelled => Critical,

            CustomerCreated | CustomerReactivated => Medium,
            CustomerEdited => Low,
            CustomerDeactivated => High,

            ClosingGenerated => Critical,
            ClosingSent => High,
            ClosingConfigured => Medium,

            RoleCreated | RoleEdited => High,
            RoleDeleted | PermissionsChanged => Critical,

            SettingsChanged | UserCreated => High,
            UserEdited => Medium,
            UserDeactivated => Critical,
            OfflineOperationQueued => Low,
            OfflineOperationExpired => Medium,
            OfflineSyncConflict | OfflineConflictResolved => High,

            LoginSucceeded | LogoutSucceeded => Low,
            AccessDenied => High,
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "decision kind",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// Who made the decision. Separates human acts from automated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    Human,
    AutomatedAgentA,
    AutomatedAgentB,
    System,
    ExternalChannel,
}

impl DecisionOrigin {
    pub const ALL: [DecisionOrigin; 5] = [
        DecisionOrigin::Human,
        DecisionOrigin::AutomatedAgentA,
        DecisionOrigin::AutomatedAgentB,
        DecisionOrigin::System,
        DecisionOrigin::ExternalChannel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionOrigin::Human => "human",
            DecisionOrigin::AutomatedAgentA => "automated_agent_a",
            DecisionOrigin::AutomatedAgentB => "automated_agent_b",
            DecisionOrigin::System => "system",
            DecisionOrigin::ExternalChannel => "external_channel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DecisionOrigin::Human => "Human",
            DecisionOrigin::AutomatedAgentA => "Automated agent (A)",
            DecisionOrigin::AutomatedAgentB => "Automated agent (B)",
            DecisionOrigin::System => "System",
            DecisionOrigin::ExternalChannel => "External channel",
        }
    }

    /// Whether the decision came from an automated agent.
    pub fn is_automated(self) -> bool {
        matches!(
            self,
            DecisionOrigin::AutomatedAgentA | DecisionOrigin::AutomatedAgentB
        )
    }

    /// Only human decisions must name an actor.
    pub fn requires_actor(self) -> bool {
        matches!(self, DecisionOrigin::Human)
    }
}

impl fmt::Display for DecisionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionOrigin {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionOrigin::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "decision origin",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

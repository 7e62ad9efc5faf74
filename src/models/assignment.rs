use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One assignment decision for a lead. Rows are append-only; the latest
/// row by `assigned_at` is the lead's effective assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct LeadAssignment {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Null iff `status` is `unassigned`.
    pub caller_id: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
    pub assignment_reason: String,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "lead_assignment_status", rename_all = "lowercase")]
pub enum AssignmentStatus {
    Assigned,
    Unassigned,
}

/// Closed set of reason codes the engine emits. Manual mode may carry an
/// arbitrary operator-supplied override instead, so assignment rows store
/// the reason as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentReason {
    StateRoundRobin,
    GlobalRoundRobin,
    ManualReassign,
    UnassignedCapReached,
    UnassignedNoEligible,
}

impl AssignmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentReason::StateRoundRobin => "state_round_robin",
            AssignmentReason::GlobalRoundRobin => "global_round_robin",
            AssignmentReason::ManualReassign => "manual_reassign",
            AssignmentReason::UnassignedCapReached => "unassigned_cap_reached",
            AssignmentReason::UnassignedNoEligible => "unassigned_no_eligible",
        }
    }
}

impl fmt::Display for AssignmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent rotation state for one routing key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoundRobinPointer {
    pub key: String,
    pub last_caller_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Per-caller, per-business-date assignment count. Never deleted; always
/// equals the number of assigned rows for that caller on that date.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallerDailyCounter {
    pub caller_id: Uuid,
    pub date: NaiveDate,
    pub count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&AssignmentStatus::Assigned).unwrap(), "\"assigned\"");
        assert_eq!(serde_json::to_string(&AssignmentStatus::Unassigned).unwrap(), "\"unassigned\"");
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(AssignmentReason::StateRoundRobin.as_str(), "state_round_robin");
        assert_eq!(AssignmentReason::GlobalRoundRobin.as_str(), "global_round_robin");
        assert_eq!(AssignmentReason::ManualReassign.as_str(), "manual_reassign");
        assert_eq!(AssignmentReason::UnassignedCapReached.as_str(), "unassigned_cap_reached");
        assert_eq!(AssignmentReason::UnassignedNoEligible.as_str(), "unassigned_no_eligible");
    }
}

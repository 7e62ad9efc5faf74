use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AssignmentStatus, LeadAssignment};

/// An inbound sales lead ingested from the spreadsheet webhook.
///
/// `(phone, timestamp_from_sheet)` is globally unique and serves as the
/// idempotency key for webhook retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub name: Option<String>,
    pub phone: String,
    pub timestamp_from_sheet: DateTime<Utc>,
    pub lead_source: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// True when the engine could not place the lead.
    pub unassigned: bool,
}

impl Lead {
    /// Routing state, ignoring empty strings from sloppy sheet rows.
    pub fn routing_state(&self) -> Option<&str> {
        self.state.as_deref().filter(|s| !s.is_empty())
    }
}

/// Webhook body posted by the spreadsheet integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadWebhookPayload {
    pub name: Option<String>,
    pub phone: String,
    pub timestamp: DateTime<Utc>,
    pub lead_source: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Lead detail with the attributes of its latest assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadOut {
    pub id: Uuid,
    pub name: Option<String>,
    pub phone: String,
    pub lead_source: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub assigned_caller_id: Option<Uuid>,
    pub assignment_status: Option<AssignmentStatus>,
    pub assignment_reason: Option<String>,
}

impl LeadOut {
    pub fn from_parts(lead: Lead, assignment: Option<&LeadAssignment>) -> Self {
        Self {
            id: lead.id,
            name: lead.name,
            phone: lead.phone,
            lead_source: lead.lead_source,
            city: lead.city,
            state: lead.state,
            metadata: lead.metadata,
            created_at: lead.created_at,
            assigned_caller_id: assignment.and_then(|a| a.caller_id),
            assignment_status: assignment.map(|a| a.status),
            assignment_reason: assignment.map(|a| a.assignment_reason.clone()),
        }
    }
}

/// One row of the lead listing, flattened with its latest assignment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadListItem {
    pub id: Uuid,
    pub name: Option<String>,
    pub phone: String,
    pub state: Option<String>,
    pub lead_source: Option<String>,
    pub assigned_caller_name: Option<String>,
    pub assignment_status: Option<AssignmentStatus>,
    pub assignment_reason: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// `caller_id = null` reruns the automatic pipeline; a UUID forces that caller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeadReassignRequest {
    pub caller_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeadListQuery {
    pub state: Option<String>,
    pub caller_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

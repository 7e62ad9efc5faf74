//! Assignment row operations
//!
//! Assignment rows are append-only; the latest row by `assigned_at` is a
//! lead's effective assignment.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{AssignmentStatus, LeadAssignment};

const ASSIGNMENT_COLUMNS: &str = "id, lead_id, caller_id, assigned_at, assignment_reason, status";

pub async fn insert(
    conn: &mut PgConnection,
    lead_id: Uuid,
    caller_id: Option<Uuid>,
    reason: &str,
    status: AssignmentStatus,
) -> Result<LeadAssignment, sqlx::Error> {
    sqlx::query_as::<_, LeadAssignment>(&format!(
        r#"
        INSERT INTO lead_assignments (id, lead_id, caller_id, assignment_reason, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(lead_id)
    .bind(caller_id)
    .bind(reason)
    .bind(status)
    .fetch_one(conn)
    .await
}

pub async fn latest_for_lead(
    pool: &PgPool,
    lead_id: Uuid,
) -> Result<Option<LeadAssignment>, sqlx::Error> {
    sqlx::query_as::<_, LeadAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM lead_assignments
        WHERE lead_id = $1
        ORDER BY assigned_at DESC
        LIMIT 1
        "#
    ))
    .bind(lead_id)
    .fetch_optional(pool)
    .await
}

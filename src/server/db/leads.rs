//! Lead database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{Lead, LeadListItem, LeadListQuery, LeadWebhookPayload};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

const LEAD_COLUMNS: &str = "id, name, phone, timestamp_from_sheet, lead_source, city, state, \
                            metadata, created_at, unassigned";

/// Insert a lead from a webhook submission. Returns `None` when a lead
/// with the same `(phone, timestamp_from_sheet)` already exists, which is
/// how a retried submission is detected.
pub async fn insert(
    conn: &mut PgConnection,
    payload: &LeadWebhookPayload,
) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(&format!(
        r#"
        INSERT INTO leads (id, name, phone, timestamp_from_sheet, lead_source, city, state, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT ON CONSTRAINT uq_lead_phone_ts DO NOTHING
        RETURNING {LEAD_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&payload.name)
    .bind(&payload.phone)
    .bind(payload.timestamp)
    .bind(&payload.lead_source)
    .bind(&payload.city)
    .bind(&payload.state)
    .bind(&payload.metadata)
    .fetch_optional(conn)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_phone_and_timestamp(
    pool: &PgPool,
    phone: &str,
    timestamp: DateTime<Utc>,
) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(&format!(
        "SELECT {LEAD_COLUMNS} FROM leads WHERE phone = $1 AND timestamp_from_sheet = $2"
    ))
    .bind(phone)
    .bind(timestamp)
    .fetch_optional(pool)
    .await
}

/// Record whether the latest engine run placed the lead.
pub async fn set_unassigned(
    conn: &mut PgConnection,
    id: Uuid,
    unassigned: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE leads SET unassigned = $2 WHERE id = $1")
        .bind(id)
        .bind(unassigned)
        .execute(conn)
        .await?;
    Ok(())
}

/// Lead listing with optional filters, newest first. Each row is joined
/// with its latest assignment and that assignment's caller name.
pub async fn list(pool: &PgPool, query: &LeadListQuery) -> Result<Vec<LeadListItem>, sqlx::Error> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(0, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let search = query.search.as_ref().map(|s| format!("%{s}%"));

    sqlx::query_as::<_, LeadListItem>(
        r#"
        SELECT l.id, l.name, l.phone, l.state, l.lead_source,
               c.name AS assigned_caller_name,
               la.status AS assignment_status,
               la.assignment_reason,
               la.assigned_at
        FROM leads l
        LEFT JOIN LATERAL (
            SELECT a.caller_id, a.status, a.assignment_reason, a.assigned_at
            FROM lead_assignments a
            WHERE a.lead_id = l.id
            ORDER BY a.assigned_at DESC
            LIMIT 1
        ) la ON TRUE
        LEFT JOIN callers c ON c.id = la.caller_id
        WHERE ($1::varchar IS NULL OR l.state = $1)
          AND ($2::uuid IS NULL OR la.caller_id = $2)
          AND ($3::varchar IS NULL OR l.phone ILIKE $3 OR l.name ILIKE $3)
        ORDER BY l.created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(&query.state)
    .bind(query.caller_id)
    .bind(&search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

//! Spreadsheet webhook ingest
//!
//! `POST /api/leads/webhook`. Submissions are idempotent on
//! `(phone, timestamp)`: a retried row reuses the existing lead and
//! mirrors its assignment instead of running the engine again, so a
//! retry never moves counters or creates assignment rows.

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use super::{assignment, db, error::ApiError, realtime::AssignmentEvent, AppState};
use crate::models::{LeadOut, LeadWebhookPayload};

pub const SECRET_HEADER: &str = "x-webhook-secret";

pub async fn lead_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LeadWebhookPayload>,
) -> Result<Json<LeadOut>, ApiError> {
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !secret_matches(state.webhook_secret.as_deref(), provided) {
        tracing::warn!("webhook rejected - invalid secret");
        return Err(ApiError::Unauthorized);
    }

    let mut tx = state.db.begin().await?;
    if let Some(lead) = db::leads::insert(&mut *tx, &payload).await? {
        let assignment = assignment::assign_lead(&mut tx, &lead, None, None).await?;
        tx.commit().await?;

        state
            .broadcaster
            .broadcast_assignment(AssignmentEvent::from_assignment(&assignment));
        return Ok(Json(LeadOut::from_parts(lead, Some(&assignment))));
    }
    tx.rollback().await?;

    // Retried submission: the lead already exists.
    let lead =
        db::leads::find_by_phone_and_timestamp(&state.db, &payload.phone, payload.timestamp)
            .await?
            .ok_or(ApiError::NotFound("lead not found"))?;

    if let Some(existing) = db::assignments::latest_for_lead(&state.db, lead.id).await? {
        tracing::info!(lead_id = %lead.id, phone = %lead.phone, "webhook duplicate, mirroring existing assignment");
        return Ok(Json(LeadOut::from_parts(lead, Some(&existing))));
    }

    // The lead row exists but was never assigned (interrupted earlier run);
    // converge by assigning it now.
    let mut tx = state.db.begin().await?;
    let assignment = assignment::assign_lead(&mut tx, &lead, None, None).await?;
    tx.commit().await?;

    state
        .broadcaster
        .broadcast_assignment(AssignmentEvent::from_assignment(&assignment));
    Ok(Json(LeadOut::from_parts(lead, Some(&assignment))))
}

/// A secret is required only when one is configured; comparison is
/// byte-for-byte on the header value.
fn secret_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => provided == Some(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_configured_secret_accepts_anything() {
        assert!(secret_matches(None, None));
        assert!(secret_matches(None, Some("whatever")));
    }

    #[test]
    fn configured_secret_requires_exact_match() {
        assert!(secret_matches(Some("super-secret"), Some("super-secret")));
        assert!(!secret_matches(Some("super-secret"), Some("wrong")));
        assert!(!secret_matches(Some("super-secret"), Some("Super-Secret")));
        assert!(!secret_matches(Some("super-secret"), None));
    }
}

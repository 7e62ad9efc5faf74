//! Lead listing, detail, and manual reassignment handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use super::{assignment, db, error::ApiError, realtime::AssignmentEvent, AppState};
use crate::models::{LeadListItem, LeadListQuery, LeadOut, LeadReassignRequest};

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeadListQuery>,
) -> Result<Json<Vec<LeadListItem>>, ApiError> {
    let items = db::leads::list(&state.db, &query).await?;
    Ok(Json(items))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadOut>, ApiError> {
    let lead = db::leads::get_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("lead not found"))?;
    let latest = db::assignments::latest_for_lead(&state.db, lead.id).await?;
    Ok(Json(LeadOut::from_parts(lead, latest.as_ref())))
}

/// `PATCH /api/leads/{id}/reassign` - a UUID forces that caller (operator
/// action, bypasses state affinity and the daily cap); null reruns the
/// automatic pipeline.
pub async fn reassign_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<LeadReassignRequest>,
) -> Result<Json<LeadOut>, ApiError> {
    let lead = db::leads::get_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("lead not found"))?;

    let mut tx = state.db.begin().await?;
    let assignment = assignment::assign_lead(&mut tx, &lead, req.caller_id, None).await?;
    tx.commit().await?;

    state
        .broadcaster
        .broadcast_assignment(AssignmentEvent::from_assignment(&assignment));
    Ok(Json(LeadOut::from_parts(lead, Some(&assignment))))
}

//! Caller CRUD handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{assignment, db, error::ApiError, AppState};
use crate::models::{
    CallerOut, CallerStatus, CallerStatusUpdate, CreateCallerRequest, UpdateCallerRequest,
};

pub async fn create_caller(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCallerRequest>,
) -> Result<(StatusCode, Json<CallerOut>), ApiError> {
    if req.daily_limit < 0 {
        return Err(ApiError::BadRequest("daily_limit must be non-negative".to_string()));
    }

    let caller = db::callers::create(&state.db, &req).await?;
    tracing::info!(caller = %caller.id, name = %caller.name, "caller created");

    let out = caller_out(&state, caller.id).await?.ok_or(ApiError::NotFound("caller not found"))?;
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn list_callers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CallerOut>>, ApiError> {
    let today = assignment::business_date();

    let callers = db::callers::get_all(&state.db).await?;
    let ids: Vec<Uuid> = callers.iter().map(|c| c.id).collect();
    let mut states_map = db::callers::states_map(&state.db, &ids).await?;
    let counts: HashMap<Uuid, i32> = db::counters::counts_on(&state.db, today)
        .await?
        .into_iter()
        .map(|c| (c.caller_id, c.count))
        .collect();

    let out = callers
        .into_iter()
        .map(|c| {
            let states = states_map.remove(&c.id).unwrap_or_default();
            let today_count = counts.get(&c.id).copied().unwrap_or(0);
            CallerOut::from_caller(c, states, today_count)
        })
        .collect();
    Ok(Json(out))
}

pub async fn get_caller(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CallerOut>, ApiError> {
    let out = caller_out(&state, id).await?.ok_or(ApiError::NotFound("caller not found"))?;
    Ok(Json(out))
}

pub async fn update_caller(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCallerRequest>,
) -> Result<Json<CallerOut>, ApiError> {
    if req.daily_limit.is_some_and(|limit| limit < 0) {
        return Err(ApiError::BadRequest("daily_limit must be non-negative".to_string()));
    }

    let caller = db::callers::update(&state.db, id, &req)
        .await?
        .ok_or(ApiError::NotFound("caller not found"))?;

    let out = caller_out(&state, caller.id).await?.ok_or(ApiError::NotFound("caller not found"))?;
    Ok(Json(out))
}

pub async fn update_caller_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CallerStatusUpdate>,
) -> Result<Json<CallerOut>, ApiError> {
    let caller = db::callers::update_status(&state.db, id, req.status)
        .await?
        .ok_or(ApiError::NotFound("caller not found"))?;
    tracing::info!(caller = %caller.id, status = ?caller.status, "caller status changed");

    let out = caller_out(&state, caller.id).await?.ok_or(ApiError::NotFound("caller not found"))?;
    Ok(Json(out))
}

/// Soft delete: the caller is paused, keeping its assignment history and
/// counters intact.
pub async fn delete_caller(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    db::callers::update_status(&state.db, id, CallerStatus::Paused)
        .await?
        .ok_or(ApiError::NotFound("caller not found"))?;
    tracing::info!(caller = %id, "caller soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn caller_out(state: &AppState, id: Uuid) -> Result<Option<CallerOut>, ApiError> {
    let Some(caller) = db::callers::get_by_id(&state.db, id).await? else {
        return Ok(None);
    };
    let states = db::callers::states_for(&state.db, caller.id).await?;
    let today_count =
        db::counters::count_for(&state.db, caller.id, assignment::business_date()).await?;
    Ok(Some(CallerOut::from_caller(caller, states, today_count)))
}

//! Lead assignment engine
//!
//! The transactional decision procedure behind webhook ingest and manual
//! reassignment. Given a lead, it selects a caller (or records an
//! unassigned outcome) under three interacting constraints:
//!
//! - state-affinity routing with a global fallback,
//! - per-caller daily quotas bucketed by business date,
//! - fair round-robin rotation with one persistent pointer per routing key.
//!
//! Everything runs inside a transaction owned by the HTTP handler; the
//! handler commits after the engine returns so lead insert, assignment,
//! and event emission compose atomically from the client's point of view.
//! Eligibility, counter, and pointer reads all take row-level write locks,
//! so concurrent assignments competing for the same routing key serialize
//! on the intersecting rows and the cap filter is never double-counted.

use chrono::{NaiveDate, Utc};
use sqlx::{PgConnection, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use super::db;
use crate::models::{AssignmentReason, AssignmentStatus, Caller, CallerStatus, Lead, LeadAssignment};

#[derive(Debug, Error)]
pub enum AssignError {
    #[error("forced caller is not active or does not exist")]
    InvalidForcedCaller,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Today's date in the engine's single logical time zone (UTC). Captured
/// once per `assign_lead` call so every "today" within one invocation
/// resolves to the same value.
pub fn business_date() -> NaiveDate {
    Utc::now().date_naive()
}

/// Which round-robin pointer governs a rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingKey {
    State(String),
    Global,
}

impl RoutingKey {
    pub fn as_key(&self) -> String {
        match self {
            RoutingKey::State(s) => format!("state:{s}"),
            RoutingKey::Global => "global".to_string(),
        }
    }

    fn reason(&self) -> AssignmentReason {
        match self {
            RoutingKey::State(_) => AssignmentReason::StateRoundRobin,
            RoutingKey::Global => AssignmentReason::GlobalRoundRobin,
        }
    }
}

/// Assign `lead` inside the open transaction, using today as the
/// business date. Commit is the caller's responsibility.
pub async fn assign_lead(
    tx: &mut Transaction<'_, Postgres>,
    lead: &Lead,
    forced_caller_id: Option<Uuid>,
    reason_override: Option<String>,
) -> Result<LeadAssignment, AssignError> {
    assign_lead_on(tx, lead, forced_caller_id, reason_override, business_date()).await
}

/// Like [`assign_lead`] with an explicit business date.
pub async fn assign_lead_on(
    tx: &mut Transaction<'_, Postgres>,
    lead: &Lead,
    forced_caller_id: Option<Uuid>,
    reason_override: Option<String>,
    business_date: NaiveDate,
) -> Result<LeadAssignment, AssignError> {
    let started = Instant::now();
    tracing::info!(lead_id = %lead.id, phone = %lead.phone, state = ?lead.state, "assign start");

    // Manual mode: operator action, bypasses state affinity and the cap.
    if let Some(forced) = forced_caller_id {
        let caller = db::callers::lock_by_id(&mut **tx, forced)
            .await?
            .filter(|c| c.status == CallerStatus::Active)
            .ok_or(AssignError::InvalidForcedCaller)?;

        let reason =
            reason_override.unwrap_or_else(|| AssignmentReason::ManualReassign.to_string());
        tracing::info!(caller = %caller.id, name = %caller.name, reason = %reason, "assign manual");
        return finalize_assigned(tx, lead, caller.id, &reason, business_date, started).await;
    }

    let (candidates, key) = select_candidates(&mut **tx, lead.routing_state()).await?;
    tracing::debug!(count = candidates.len(), key = %key.as_key(), "assign candidates");

    if candidates.is_empty() {
        return finalize_unassigned(tx, lead, AssignmentReason::UnassignedNoEligible).await;
    }

    let caller_ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
    let counters = db::counters::lock_for_callers(&mut **tx, &caller_ids, business_date).await?;
    let counts: HashMap<Uuid, i32> =
        counters.into_iter().map(|c| (c.caller_id, c.count)).collect();

    let eligible = apply_daily_cap(candidates, &counts);
    tracing::debug!(count = eligible.len(), date = %business_date, "assign cap filtered");

    if eligible.is_empty() {
        return finalize_unassigned(tx, lead, AssignmentReason::UnassignedCapReached).await;
    }

    let pointer = db::pointers::lock_or_create(&mut **tx, &key.as_key()).await?;
    let Some(chosen) = next_in_rotation(&eligible, pointer.last_caller_id) else {
        return finalize_unassigned(tx, lead, AssignmentReason::UnassignedNoEligible).await;
    };
    let chosen_id = chosen.id;

    db::pointers::advance(&mut **tx, &key.as_key(), chosen_id).await?;

    let reason = key.reason();
    tracing::info!(caller = %chosen_id, key = %key.as_key(), reason = %reason, "assign chosen");
    finalize_assigned(tx, lead, chosen_id, reason.as_str(), business_date, started).await
}

/// Candidate set and routing key, decided together: the key is
/// state-scoped iff at least one active caller is explicitly assigned to
/// the lead's state. The cap filter runs later and never changes the key,
/// so a state whose callers are all capped goes unassigned instead of
/// leaking to a global caller.
async fn select_candidates(
    conn: &mut PgConnection,
    routing_state: Option<&str>,
) -> Result<(Vec<Caller>, RoutingKey), sqlx::Error> {
    if let Some(state) = routing_state {
        let state_matched = db::callers::lock_active_in_state(&mut *conn, state).await?;
        if !state_matched.is_empty() {
            return Ok((state_matched, RoutingKey::State(state.to_string())));
        }
    }
    let all_active = db::callers::lock_all_active(conn).await?;
    Ok((all_active, RoutingKey::Global))
}

/// Drop callers that have reached their daily limit. A limit of 0 encodes
/// unlimited and is never dropped.
fn apply_daily_cap(candidates: Vec<Caller>, counts: &HashMap<Uuid, i32>) -> Vec<Caller> {
    candidates
        .into_iter()
        .filter(|c| {
            c.daily_limit == 0 || counts.get(&c.id).copied().unwrap_or(0) < c.daily_limit
        })
        .collect()
}

/// Pick the caller after the last-chosen one in UUID order. The sort on a
/// stable identity keeps rotation deterministic as callers join or leave;
/// a vanished pointer target restarts at index 0.
fn next_in_rotation(eligible: &[Caller], last_caller_id: Option<Uuid>) -> Option<&Caller> {
    if eligible.is_empty() {
        return None;
    }
    let mut ordered: Vec<&Caller> = eligible.iter().collect();
    ordered.sort_by_key(|c| c.id);

    let chosen = match last_caller_id.and_then(|last| ordered.iter().position(|c| c.id == last)) {
        Some(idx) => ordered[(idx + 1) % ordered.len()],
        None => ordered[0],
    };
    Some(chosen)
}

async fn finalize_assigned(
    tx: &mut Transaction<'_, Postgres>,
    lead: &Lead,
    caller_id: Uuid,
    reason: &str,
    business_date: NaiveDate,
    started: Instant,
) -> Result<LeadAssignment, AssignError> {
    let count = db::counters::increment(&mut **tx, caller_id, business_date).await?;
    db::leads::set_unassigned(&mut **tx, lead.id, false).await?;
    let assignment = db::assignments::insert(
        &mut **tx,
        lead.id,
        Some(caller_id),
        reason,
        AssignmentStatus::Assigned,
    )
    .await?;

    tracing::info!(
        lead_id = %lead.id,
        caller = %caller_id,
        reason,
        count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "assign complete"
    );
    Ok(assignment)
}

async fn finalize_unassigned(
    tx: &mut Transaction<'_, Postgres>,
    lead: &Lead,
    reason: AssignmentReason,
) -> Result<LeadAssignment, AssignError> {
    tracing::warn!(lead_id = %lead.id, reason = %reason, "assign unassigned");
    db::leads::set_unassigned(&mut **tx, lead.id, true).await?;
    let assignment = db::assignments::insert(
        &mut **tx,
        lead.id,
        None,
        reason.as_str(),
        AssignmentStatus::Unassigned,
    )
    .await?;
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn caller(daily_limit: i32) -> Caller {
        Caller {
            id: Uuid::new_v4(),
            name: "caller".to_string(),
            role: None,
            languages: vec![],
            daily_limit,
            status: CallerStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn routing_key_forms() {
        assert_eq!(RoutingKey::State("maharashtra".into()).as_key(), "state:maharashtra");
        assert_eq!(RoutingKey::Global.as_key(), "global");
    }

    #[test]
    fn routing_key_reasons() {
        assert_eq!(
            RoutingKey::State("goa".into()).reason(),
            AssignmentReason::StateRoundRobin
        );
        assert_eq!(RoutingKey::Global.reason(), AssignmentReason::GlobalRoundRobin);
    }

    #[test]
    fn cap_filter_drops_callers_at_limit() {
        let under = caller(5);
        let at_cap = caller(2);
        let mut counts = HashMap::new();
        counts.insert(under.id, 4);
        counts.insert(at_cap.id, 2);

        let eligible = apply_daily_cap(vec![under.clone(), at_cap], &counts);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, under.id);
    }

    #[test]
    fn cap_filter_never_drops_unlimited() {
        let unlimited = caller(0);
        let mut counts = HashMap::new();
        counts.insert(unlimited.id, 10_000);

        let eligible = apply_daily_cap(vec![unlimited.clone()], &counts);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, unlimited.id);
    }

    #[test]
    fn cap_filter_treats_missing_counter_as_zero() {
        let fresh = caller(1);
        let eligible = apply_daily_cap(vec![fresh.clone()], &HashMap::new());
        assert_eq!(eligible.len(), 1);
    }

    #[test]
    fn rotation_starts_at_first_in_id_order() {
        let mut callers = vec![caller(0), caller(0), caller(0)];
        callers.sort_by_key(|c| c.id);
        let first = callers[0].id;

        // Shuffle query order; the choice must not depend on it.
        callers.rotate_left(1);
        let chosen = next_in_rotation(&callers, None).unwrap();
        assert_eq!(chosen.id, first);
    }

    #[test]
    fn rotation_advances_and_wraps() {
        let mut callers = vec![caller(0), caller(0), caller(0)];
        callers.sort_by_key(|c| c.id);
        let ids: Vec<Uuid> = callers.iter().map(|c| c.id).collect();

        assert_eq!(next_in_rotation(&callers, Some(ids[0])).unwrap().id, ids[1]);
        assert_eq!(next_in_rotation(&callers, Some(ids[1])).unwrap().id, ids[2]);
        assert_eq!(next_in_rotation(&callers, Some(ids[2])).unwrap().id, ids[0]);
    }

    #[test]
    fn rotation_restarts_when_pointer_target_gone() {
        let mut callers = vec![caller(0), caller(0)];
        callers.sort_by_key(|c| c.id);
        let departed = Uuid::new_v4();

        let chosen = next_in_rotation(&callers, Some(departed)).unwrap();
        assert_eq!(chosen.id, callers[0].id);
    }

    #[test]
    fn rotation_over_empty_set_yields_none() {
        assert!(next_in_rotation(&[], None).is_none());
    }

    // Round robin over an unchanging set of size n distributes k*n
    // assignments exactly evenly.
    #[test]
    fn rotation_distributes_evenly() {
        let callers: Vec<Caller> = (0..3).map(|_| caller(0)).collect();
        let mut last: Option<Uuid> = None;
        let mut tally: HashMap<Uuid, u32> = HashMap::new();

        for _ in 0..12 {
            let chosen = next_in_rotation(&callers, last).unwrap();
            *tally.entry(chosen.id).or_default() += 1;
            last = Some(chosen.id);
        }

        assert_eq!(tally.len(), 3);
        assert!(tally.values().all(|&n| n == 4));
    }

    // Interaction law: capped callers leave the rotation once their
    // counter reaches the limit, and the survivors keep rotating.
    #[test]
    fn rotation_with_caps_drains_capped_caller() {
        let capped = caller(2);
        let unlimited = caller(0);
        let pool = vec![capped.clone(), unlimited.clone()];

        let mut counts: HashMap<Uuid, i32> = HashMap::new();
        let mut last: Option<Uuid> = None;
        let mut capped_got = 0;

        for _ in 0..6 {
            let eligible = apply_daily_cap(pool.clone(), &counts);
            let chosen = next_in_rotation(&eligible, last).unwrap().clone();
            *counts.entry(chosen.id).or_default() += 1;
            last = Some(chosen.id);
            if chosen.id == capped.id {
                capped_got += 1;
            }
        }

        assert_eq!(capped_got, 2);
        assert_eq!(counts.get(&unlimited.id).copied().unwrap_or(0), 4);
    }
}

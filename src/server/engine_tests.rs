//! End-to-end assignment engine tests against a live PostgreSQL.
//!
//! These cover the full transactional pipeline (eligibility, rotation,
//! counters, idempotent ingest) and are ignored by default. Run them with
//! a dedicated database:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -- --ignored --test-threads=1
//! ```
//!
//! Each test truncates all tables, so never point DATABASE_URL at real data.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::assignment::{self, AssignError};
use super::db;
use crate::models::{
    AssignmentStatus, Caller, CallerStatus, CreateCallerRequest, Lead, LeadAssignment,
    LeadWebhookPayload,
};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for engine tests");
    let pool = db::init_pool(&url).await.expect("connect to test database");
    db::run_migrations(&pool).await.expect("run migrations");
    sqlx::query(
        "TRUNCATE TABLE lead_assignments, caller_daily_counters, caller_states, \
         rr_pointers, leads, callers CASCADE",
    )
    .execute(&pool)
    .await
    .expect("reset tables");
    pool
}

async fn make_caller(
    pool: &PgPool,
    name: &str,
    daily_limit: i32,
    states: &[&str],
    status: CallerStatus,
) -> Caller {
    db::callers::create(
        pool,
        &CreateCallerRequest {
            name: name.to_string(),
            role: Some("Agent".to_string()),
            languages: vec!["english".to_string()],
            daily_limit,
            assigned_states: states.iter().map(|s| s.to_string()).collect(),
            status,
        },
    )
    .await
    .expect("create caller")
}

async fn make_lead(pool: &PgPool, phone: &str, state: Option<&str>) -> Lead {
    let payload = LeadWebhookPayload {
        name: None,
        phone: phone.to_string(),
        timestamp: Utc::now(),
        lead_source: Some("google_sheet".to_string()),
        city: None,
        state: state.map(|s| s.to_string()),
        metadata: None,
    };
    let mut conn = pool.acquire().await.expect("acquire connection");
    db::leads::insert(&mut *conn, &payload)
        .await
        .expect("insert lead")
        .expect("lead should be fresh")
}

async fn assign(
    pool: &PgPool,
    lead: &Lead,
    forced: Option<Uuid>,
) -> Result<LeadAssignment, AssignError> {
    let mut tx = pool.begin().await.expect("begin transaction");
    let result = assignment::assign_lead(&mut tx, lead, forced, None).await;
    if result.is_ok() {
        tx.commit().await.expect("commit");
    } else {
        tx.rollback().await.expect("rollback");
    }
    result
}

async fn counter_for(pool: &PgPool, caller_id: Uuid) -> i32 {
    db::counters::count_for(pool, caller_id, assignment::business_date())
        .await
        .expect("read counter")
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn state_matched_caller_wins() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 0, &["maharashtra"], CallerStatus::Active).await;
    let _bob = make_caller(&pool, "Bob", 0, &["karnataka"], CallerStatus::Active).await;

    let lead = make_lead(&pool, "1111111111", Some("maharashtra")).await;
    let assignment = assign(&pool, &lead, None).await.unwrap();

    assert_eq!(assignment.caller_id, Some(alice.id));
    assert_eq!(assignment.assignment_reason, "state_round_robin");
    assert_eq!(assignment.status, AssignmentStatus::Assigned);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn falls_back_to_global_without_state_match() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 0, &["maharashtra"], CallerStatus::Active).await;

    let lead = make_lead(&pool, "2222222222", Some("kerala")).await;
    let assignment = assign(&pool, &lead, None).await.unwrap();

    assert_eq!(assignment.caller_id, Some(alice.id));
    assert_eq!(assignment.assignment_reason, "global_round_robin");
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn round_robin_alternates_between_callers() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 0, &[], CallerStatus::Active).await;
    let bob = make_caller(&pool, "Bob", 0, &[], CallerStatus::Active).await;

    let mut assigned = Vec::new();
    for i in 0..4 {
        let lead = make_lead(&pool, &format!("30000000{i:02}"), None).await;
        assigned.push(assign(&pool, &lead, None).await.unwrap().caller_id.unwrap());
    }

    assert_eq!(assigned.iter().filter(|&&id| id == alice.id).count(), 2);
    assert_eq!(assigned.iter().filter(|&&id| id == bob.id).count(), 2);
    assert_ne!(assigned[0], assigned[1]);
    assert_ne!(assigned[1], assigned[2]);
    assert_ne!(assigned[2], assigned[3]);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn daily_cap_yields_unassigned() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 2, &[], CallerStatus::Active).await;

    let first = make_lead(&pool, "4000000001", None).await;
    let second = make_lead(&pool, "4000000002", None).await;
    let third = make_lead(&pool, "4000000003", None).await;

    assert_eq!(assign(&pool, &first, None).await.unwrap().caller_id, Some(alice.id));
    assert_eq!(assign(&pool, &second, None).await.unwrap().caller_id, Some(alice.id));

    let overflow = assign(&pool, &third, None).await.unwrap();
    assert_eq!(overflow.status, AssignmentStatus::Unassigned);
    assert_eq!(overflow.caller_id, None);
    assert_eq!(overflow.assignment_reason, "unassigned_cap_reached");

    assert_eq!(counter_for(&pool, alice.id).await, 2);
    let third_after = db::leads::get_by_id(&pool, third.id).await.unwrap().unwrap();
    assert!(third_after.unassigned);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn paused_caller_never_selected() {
    let pool = test_pool().await;
    make_caller(&pool, "Paused", 0, &[], CallerStatus::Paused).await;

    let lead = make_lead(&pool, "6000000000", None).await;
    let assignment = assign(&pool, &lead, None).await.unwrap();

    assert_eq!(assignment.status, AssignmentStatus::Unassigned);
    assert_eq!(assignment.caller_id, None);
    assert_eq!(assignment.assignment_reason, "unassigned_no_eligible");
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn manual_reassign_bypasses_rotation() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 0, &[], CallerStatus::Active).await;
    let bob = make_caller(&pool, "Bob", 0, &[], CallerStatus::Active).await;

    let lead = make_lead(&pool, "8800000001", None).await;
    let auto = assign(&pool, &lead, None).await.unwrap();
    let first = auto.caller_id.unwrap();
    let other = if first == alice.id { bob.id } else { alice.id };

    let manual = assign(&pool, &lead, Some(other)).await.unwrap();
    assert_eq!(manual.caller_id, Some(other));
    assert_eq!(manual.assignment_reason, "manual_reassign");

    let latest = db::assignments::latest_for_lead(&pool, lead.id).await.unwrap().unwrap();
    assert_eq!(latest.caller_id, Some(other));

    assert_eq!(counter_for(&pool, alice.id).await, 1);
    assert_eq!(counter_for(&pool, bob.id).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn forced_paused_caller_rejected() {
    let pool = test_pool().await;
    let paused = make_caller(&pool, "Paused", 0, &[], CallerStatus::Paused).await;

    let lead = make_lead(&pool, "8800000010", None).await;
    let result = assign(&pool, &lead, Some(paused.id)).await;
    assert!(matches!(result, Err(AssignError::InvalidForcedCaller)));

    let missing = assign(&pool, &lead, Some(Uuid::new_v4())).await;
    assert!(matches!(missing, Err(AssignError::InvalidForcedCaller)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn duplicate_submission_creates_nothing() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 0, &[], CallerStatus::Active).await;

    let payload = LeadWebhookPayload {
        name: Some("Test Lead".to_string()),
        phone: "9999999999".to_string(),
        timestamp: "2026-02-25T10:00:00Z".parse().unwrap(),
        lead_source: Some("google_sheet".to_string()),
        city: Some("Mumbai".to_string()),
        state: Some("maharashtra".to_string()),
        metadata: None,
    };

    let mut conn = pool.acquire().await.unwrap();
    let lead = db::leads::insert(&mut *conn, &payload).await.unwrap().unwrap();
    assign(&pool, &lead, None).await.unwrap();

    // Retry of the same (phone, timestamp) is detected as a duplicate.
    let retry = db::leads::insert(&mut *conn, &payload).await.unwrap();
    assert!(retry.is_none());

    let found = db::leads::find_by_phone_and_timestamp(&pool, &payload.phone, payload.timestamp)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, lead.id);

    let (rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM lead_assignments WHERE lead_id = $1")
            .bind(lead.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(counter_for(&pool, alice.id).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn capped_state_does_not_leak_to_global() {
    let pool = test_pool().await;
    let alice = make_caller(&pool, "Alice", 1, &["maharashtra"], CallerStatus::Active).await;
    let _bob = make_caller(&pool, "Bob", 0, &[], CallerStatus::Active).await;

    let first = make_lead(&pool, "7000000001", Some("maharashtra")).await;
    assert_eq!(assign(&pool, &first, None).await.unwrap().caller_id, Some(alice.id));

    // Alice is capped, but the state pointer still governs: the lead goes
    // unassigned instead of leaking to Bob.
    let second = make_lead(&pool, "7000000002", Some("maharashtra")).await;
    let overflow = assign(&pool, &second, None).await.unwrap();
    assert_eq!(overflow.status, AssignmentStatus::Unassigned);
    assert_eq!(overflow.assignment_reason, "unassigned_cap_reached");
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL, run with --test-threads=1)"]
async fn counters_match_assignment_rows() {
    let pool = test_pool().await;
    make_caller(&pool, "Alice", 0, &[], CallerStatus::Active).await;
    make_caller(&pool, "Bob", 3, &[], CallerStatus::Active).await;

    for i in 0..7 {
        let lead = make_lead(&pool, &format!("50000000{i:02}"), None).await;
        let _ = assign(&pool, &lead, None).await.unwrap();
    }

    let rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT caller_id, COUNT(*)
        FROM lead_assignments
        WHERE status = 'assigned' AND caller_id IS NOT NULL
        GROUP BY caller_id
        "#,
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for (caller_id, assigned_rows) in rows {
        assert_eq!(counter_for(&pool, caller_id).await as i64, assigned_rows);
    }
}

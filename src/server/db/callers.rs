//! Caller database operations
//!
//! Pool-based functions serve the CRUD surface; the `PgConnection`
//! variants run inside an assignment transaction and take row-level
//! write locks on the callers they return.

use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Caller, CallerStatus, CreateCallerRequest, UpdateCallerRequest};

const CALLER_COLUMNS: &str =
    "id, name, role, languages, daily_limit, status, created_at, updated_at";

pub async fn get_all(pool: &PgPool) -> Result<Vec<Caller>, sqlx::Error> {
    sqlx::query_as::<_, Caller>(
        r#"
        SELECT id, name, role, languages, daily_limit, status, created_at, updated_at
        FROM callers
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Caller>, sqlx::Error> {
    sqlx::query_as::<_, Caller>(
        r#"
        SELECT id, name, role, languages, daily_limit, status, created_at, updated_at
        FROM callers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn create(pool: &PgPool, req: &CreateCallerRequest) -> Result<Caller, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let caller = sqlx::query_as::<_, Caller>(
        r#"
        INSERT INTO callers (id, name, role, languages, daily_limit, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, role, languages, daily_limit, status, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(&req.role)
    .bind(&req.languages)
    .bind(req.daily_limit)
    .bind(req.status)
    .fetch_one(&mut *tx)
    .await?;

    for state in &req.assigned_states {
        sqlx::query("INSERT INTO caller_states (caller_id, state) VALUES ($1, $2)")
            .bind(caller.id)
            .bind(state)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(caller)
}

/// Partial update; absent fields keep their current values. When
/// `assigned_states` is present the caller's state set is replaced.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    req: &UpdateCallerRequest,
) -> Result<Option<Caller>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let caller = sqlx::query_as::<_, Caller>(
        r#"
        UPDATE callers
        SET role = COALESCE($2, role),
            languages = COALESCE($3, languages),
            daily_limit = COALESCE($4, daily_limit),
            status = COALESCE($5, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, role, languages, daily_limit, status, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(&req.role)
    .bind(&req.languages)
    .bind(req.daily_limit)
    .bind(req.status)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(caller) = caller else {
        return Ok(None);
    };

    if let Some(states) = &req.assigned_states {
        sqlx::query("DELETE FROM caller_states WHERE caller_id = $1")
            .bind(caller.id)
            .execute(&mut *tx)
            .await?;
        for state in states {
            sqlx::query("INSERT INTO caller_states (caller_id, state) VALUES ($1, $2)")
                .bind(caller.id)
                .bind(state)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(Some(caller))
}

pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: CallerStatus,
) -> Result<Option<Caller>, sqlx::Error> {
    sqlx::query_as::<_, Caller>(
        r#"
        UPDATE callers
        SET status = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, role, languages, daily_limit, status, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
}

pub async fn states_for(pool: &PgPool, caller_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT state FROM caller_states WHERE caller_id = $1 ORDER BY state")
            .bind(caller_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

pub async fn states_map(
    pool: &PgPool,
    caller_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<String>>, sqlx::Error> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT caller_id, state FROM caller_states WHERE caller_id = ANY($1) ORDER BY state",
    )
    .bind(caller_ids)
    .fetch_all(pool)
    .await?;

    let mut map: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (caller_id, state) in rows {
        map.entry(caller_id).or_default().push(state);
    }
    Ok(map)
}

// ---- transactional variants used by the assignment engine ----

/// Active callers explicitly assigned to `state`, locked for the
/// duration of the transaction.
pub async fn lock_active_in_state(
    conn: &mut PgConnection,
    state: &str,
) -> Result<Vec<Caller>, sqlx::Error> {
    sqlx::query_as::<_, Caller>(
        r#"
        SELECT c.id, c.name, c.role, c.languages, c.daily_limit, c.status,
               c.created_at, c.updated_at
        FROM callers c
        JOIN caller_states cs ON cs.caller_id = c.id
        WHERE c.status = 'active' AND cs.state = $1
        FOR UPDATE OF c
        "#,
    )
    .bind(state)
    .fetch_all(conn)
    .await
}

/// All active callers, locked for the duration of the transaction.
pub async fn lock_all_active(conn: &mut PgConnection) -> Result<Vec<Caller>, sqlx::Error> {
    sqlx::query_as::<_, Caller>(&format!(
        "SELECT {CALLER_COLUMNS} FROM callers WHERE status = 'active' FOR UPDATE"
    ))
    .fetch_all(conn)
    .await
}

/// Lock a single caller row for a manual assignment.
pub async fn lock_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Caller>, sqlx::Error> {
    sqlx::query_as::<_, Caller>(&format!(
        "SELECT {CALLER_COLUMNS} FROM callers WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

//! Round-robin pointer operations
//!
//! One row per routing key. The lock-then-update sequence serializes
//! concurrent assignments competing for the same key.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::RoundRobinPointer;

/// Load the pointer for `key`, creating it lazily on first use. The row
/// is locked until the transaction ends.
pub async fn lock_or_create(
    conn: &mut PgConnection,
    key: &str,
) -> Result<RoundRobinPointer, sqlx::Error> {
    sqlx::query("INSERT INTO rr_pointers (key, last_caller_id) VALUES ($1, NULL) ON CONFLICT (key) DO NOTHING")
        .bind(key)
        .execute(&mut *conn)
        .await?;

    sqlx::query_as::<_, RoundRobinPointer>(
        "SELECT key, last_caller_id, updated_at FROM rr_pointers WHERE key = $1 FOR UPDATE",
    )
    .bind(key)
    .fetch_one(conn)
    .await
}

/// Record the chosen caller; called only on successful assignment.
pub async fn advance(
    conn: &mut PgConnection,
    key: &str,
    caller_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rr_pointers SET last_caller_id = $2, updated_at = NOW() WHERE key = $1")
        .bind(key)
        .bind(caller_id)
        .execute(conn)
        .await?;
    Ok(())
}

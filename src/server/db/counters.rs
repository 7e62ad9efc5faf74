//! Daily counter operations
//!
//! Counters are hard state: they are read under row locks and mutated in
//! the same transaction as the assignment row they account for.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::CallerDailyCounter;

/// Counters for the given callers on `date`, locked for the duration of
/// the transaction. Callers with no assignments yet have no row.
pub async fn lock_for_callers(
    conn: &mut PgConnection,
    caller_ids: &[Uuid],
    date: NaiveDate,
) -> Result<Vec<CallerDailyCounter>, sqlx::Error> {
    sqlx::query_as::<_, CallerDailyCounter>(
        r#"
        SELECT caller_id, date, count
        FROM caller_daily_counters
        WHERE caller_id = ANY($1) AND date = $2
        FOR UPDATE
        "#,
    )
    .bind(caller_ids)
    .bind(date)
    .fetch_all(conn)
    .await
}

/// Increment the counter for `(caller_id, date)`, creating it on the
/// caller's first assignment of the day. Returns the new count.
pub async fn increment(
    conn: &mut PgConnection,
    caller_id: Uuid,
    date: NaiveDate,
) -> Result<i32, sqlx::Error> {
    let (count,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO caller_daily_counters (caller_id, date, count)
        VALUES ($1, $2, 1)
        ON CONFLICT (caller_id, date)
        DO UPDATE SET count = caller_daily_counters.count + 1
        RETURNING count
        "#,
    )
    .bind(caller_id)
    .bind(date)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn count_for(
    pool: &PgPool,
    caller_id: Uuid,
    date: NaiveDate,
) -> Result<i32, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT count FROM caller_daily_counters WHERE caller_id = $1 AND date = $2",
    )
    .bind(caller_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(c,)| c).unwrap_or(0))
}

/// All counters for one business date, for the caller listing.
pub async fn counts_on(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<CallerDailyCounter>, sqlx::Error> {
    sqlx::query_as::<_, CallerDailyCounter>(
        "SELECT caller_id, date, count FROM caller_daily_counters WHERE date = $1",
    )
    .bind(date)
    .fetch_all(pool)
    .await
}

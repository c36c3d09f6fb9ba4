use sqlx::PgConnection;

use crate::cache::{
    LEADERBOARD_CACHE_TTL, PROFILE_CACHE_TTL, PROFILE_REINVALIDATE_DELAY, leaderboard_cache_key,
    profile_cache_key,
};
use crate::database::Database;
use crate::error::{LedgerError, LedgerResult};
use crate::model::leveling::{LeaderboardEntry, UserId, UserRecord, XpGrant, effective_amount};

#[derive(sqlx::FromRow)]
struct UserXpRow {
    user_id: String,
    xp: i64,
    level: i64,
    total_voice_time: i64,
}

impl UserXpRow {
    fn into_record(self) -> LedgerResult<UserRecord> {
        Ok(UserRecord {
            user_id: UserId::parse(&self.user_id)?,
            xp: to_u64(self.xp, "xp")?,
            level: to_u64(self.level, "level")?,
            total_voice_seconds: to_u64(self.total_voice_time, "total_voice_time")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LeaderboardRow {
    user_id: String,
    xp: i64,
    level: i64,
}

/// Current progress for a user; the zero record when no row exists yet.
/// Reading never creates a row.
pub async fn get_user_record(db: &Database, user_id: &UserId) -> LedgerResult<UserRecord> {
    let cache = db.cache();
    let key = profile_cache_key(cache, user_id);

    cache
        .get_or_load_json(&key, PROFILE_CACHE_TTL, move || async move {
            let mut conn = db.pool().acquire().await?;
            let record = fetch_user_row(&mut conn, user_id)
                .await?
                .unwrap_or_else(|| UserRecord::new(user_id.clone()));

            Ok::<_, LedgerError>(record)
        })
        .await
}

/// Grant `floor(amount * multiplier)` xp and persist the normalized level state.
pub async fn add_xp(
    db: &Database,
    user_id: &UserId,
    amount: u64,
    multiplier: f64,
) -> LedgerResult<XpGrant> {
    let granted = effective_amount(amount, multiplier);

    let mut tx = db.pool().begin().await?;
    lock_user(&mut tx, user_id).await?;

    let existing = fetch_user_row(&mut tx, user_id).await?;
    let exists = existing.is_some();
    let mut record = existing.unwrap_or_else(|| UserRecord::new(user_id.clone()));
    let previous_level = record.level;
    record.apply_xp(granted);

    put_user_row(&mut tx, &record, exists).await?;
    tx.commit().await?;

    invalidate_profile(db, user_id).await;

    Ok(XpGrant::new(granted, previous_level, &record))
}

/// Add `seconds` of voice presence and return the new total.
pub async fn add_voice_time(db: &Database, user_id: &UserId, seconds: u64) -> LedgerResult<u64> {
    let mut tx = db.pool().begin().await?;
    lock_user(&mut tx, user_id).await?;

    let existing = fetch_user_row(&mut tx, user_id).await?;
    let exists = existing.is_some();
    let mut record = existing.unwrap_or_else(|| UserRecord::new(user_id.clone()));
    let total = record.add_voice_seconds(seconds);

    put_user_row(&mut tx, &record, exists).await?;
    tx.commit().await?;

    invalidate_profile(db, user_id).await;

    Ok(total)
}

/// Top `limit` users by xp. Ties keep insertion order.
pub async fn leaderboard(db: &Database, limit: usize) -> LedgerResult<Vec<LeaderboardEntry>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let limit_i64 = i64::try_from(limit).map_err(|_| LedgerError::OutOfRange("limit"))?;
    let cache = db.cache();
    let key = leaderboard_cache_key(cache, limit);

    cache
        .get_or_load_json(&key, LEADERBOARD_CACHE_TTL, move || async move {
            let rows: Vec<LeaderboardRow> = sqlx::query_as(
                "SELECT user_id, xp, level
                 FROM user_xp
                 ORDER BY xp DESC, seq ASC
                 LIMIT $1",
            )
            .bind(limit_i64)
            .fetch_all(db.pool())
            .await?;

            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                entries.push(LeaderboardEntry {
                    user_id: UserId::parse(&row.user_id)?,
                    xp: to_u64(row.xp, "xp")?,
                    level: to_u64(row.level, "level")?,
                });
            }

            Ok::<_, LedgerError>(entries)
        })
        .await
}

async fn invalidate_profile(db: &Database, user_id: &UserId) {
    let key = profile_cache_key(db.cache(), user_id);
    // The follow-up delete runs detached; the write has already committed.
    let _ = db
        .cache()
        .invalidate_twice(&key, PROFILE_REINVALIDATE_DELAY)
        .await;
}

/// Serialize writers for one user until the surrounding transaction ends.
async fn lock_user(conn: &mut PgConnection, user_id: &UserId) -> LedgerResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(user_id.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn fetch_user_row(
    conn: &mut PgConnection,
    user_id: &UserId,
) -> LedgerResult<Option<UserRecord>> {
    let row: Option<UserXpRow> = sqlx::query_as(
        "SELECT user_id, xp, level, total_voice_time FROM user_xp WHERE user_id = $1",
    )
    .bind(user_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(UserXpRow::into_record).transpose()
}

async fn put_user_row(conn: &mut PgConnection, record: &UserRecord, exists: bool) -> LedgerResult<()> {
    let xp = to_i64(record.xp, "xp")?;
    let level = to_i64(record.level, "level")?;
    let total_voice_time = to_i64(record.total_voice_seconds, "total_voice_time")?;

    let statement = if exists {
        "UPDATE user_xp SET xp = $2, level = $3, total_voice_time = $4 WHERE user_id = $1"
    } else {
        "INSERT INTO user_xp (user_id, xp, level, total_voice_time) VALUES ($1, $2, $3, $4)"
    };

    sqlx::query(statement)
        .bind(record.user_id.as_str())
        .bind(xp)
        .bind(level)
        .bind(total_voice_time)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn to_u64(value: i64, column: &'static str) -> LedgerResult<u64> {
    u64::try_from(value).map_err(|_| LedgerError::OutOfRange(column))
}

fn to_i64(value: u64, column: &'static str) -> LedgerResult<i64> {
    i64::try_from(value).map_err(|_| LedgerError::OutOfRange(column))
}

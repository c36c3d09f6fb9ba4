use std::fmt::Debug;

use async_trait::async_trait;

use crate::database::Database;
use crate::error::LedgerResult;
use crate::impls::leveling;
use crate::model::leveling::{LeaderboardEntry, UserId, UserRecord, XpGrant};

/// Durable per-user progress.
///
/// Implementations must make each write an atomic read-modify-write with
/// respect to concurrent callers for the same user. There is no dedup:
/// repeating a call repeats the grant.
#[async_trait]
pub trait LedgerStore: Send + Sync + Debug {
    /// Current record, or the zero record when none has been written yet.
    async fn get(&self, user_id: &UserId) -> LedgerResult<UserRecord>;

    /// Add `floor(amount * multiplier)` xp and normalize the level.
    async fn add_xp(&self, user_id: &UserId, amount: u64, multiplier: f64)
    -> LedgerResult<XpGrant>;

    /// Add voice presence and return the new total.
    async fn add_voice_time(&self, user_id: &UserId, seconds: u64) -> LedgerResult<u64>;

    /// At most `limit` entries, descending by xp.
    async fn leaderboard(&self, limit: usize) -> LedgerResult<Vec<LeaderboardEntry>>;
}

#[async_trait]
impl LedgerStore for Database {
    async fn get(&self, user_id: &UserId) -> LedgerResult<UserRecord> {
        leveling::get_user_record(self, user_id).await
    }

    async fn add_xp(
        &self,
        user_id: &UserId,
        amount: u64,
        multiplier: f64,
    ) -> LedgerResult<XpGrant> {
        leveling::add_xp(self, user_id, amount, multiplier).await
    }

    async fn add_voice_time(&self, user_id: &UserId, seconds: u64) -> LedgerResult<u64> {
        leveling::add_voice_time(self, user_id, seconds).await
    }

    async fn leaderboard(&self, limit: usize) -> LedgerResult<Vec<LeaderboardEntry>> {
        leveling::leaderboard(self, limit).await
    }
}

//! In-process ledger used by tests and database-less runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::LedgerStore;
use crate::model::leveling::{LeaderboardEntry, UserId, UserRecord, XpGrant, effective_amount};

#[derive(Debug)]
struct StoredRecord {
    seq: u64,
    record: UserRecord,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<UserId, StoredRecord>,
    next_seq: u64,
}

impl MemoryState {
    /// get-or-default + put under one lock.
    fn update<R>(&mut self, user_id: &UserId, apply: impl FnOnce(&mut UserRecord) -> R) -> R {
        let next_seq = &mut self.next_seq;
        let stored = self.rows.entry(user_id.clone()).or_insert_with(|| {
            *next_seq += 1;
            StoredRecord {
                seq: *next_seq,
                record: UserRecord::new(user_id.clone()),
            }
        });

        apply(&mut stored.record)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreUnavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of materialized records.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> LedgerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable(sqlx::Error::PoolTimedOut));
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get(&self, user_id: &UserId) -> LedgerResult<UserRecord> {
        self.ensure_available()?;

        Ok(self
            .lock()
            .rows
            .get(user_id)
            .map(|stored| stored.record.clone())
            .unwrap_or_else(|| UserRecord::new(user_id.clone())))
    }

    async fn add_xp(
        &self,
        user_id: &UserId,
        amount: u64,
        multiplier: f64,
    ) -> LedgerResult<XpGrant> {
        self.ensure_available()?;

        let granted = effective_amount(amount, multiplier);
        let grant = self.lock().update(user_id, |record| {
            let previous_level = record.level;
            record.apply_xp(granted);
            XpGrant::new(granted, previous_level, record)
        });

        Ok(grant)
    }

    async fn add_voice_time(&self, user_id: &UserId, seconds: u64) -> LedgerResult<u64> {
        self.ensure_available()?;

        Ok(self
            .lock()
            .update(user_id, |record| record.add_voice_seconds(seconds)))
    }

    async fn leaderboard(&self, limit: usize) -> LedgerResult<Vec<LeaderboardEntry>> {
        self.ensure_available()?;

        let state = self.lock();
        let mut rows: Vec<&StoredRecord> = state.rows.values().collect();
        rows.sort_by(|left, right| {
            right
                .record
                .xp
                .cmp(&left.record.xp)
                .then_with(|| left.seq.cmp(&right.seq))
        });

        Ok(rows
            .into_iter()
            .take(limit)
            .map(|stored| LeaderboardEntry {
                user_id: stored.record.user_id.clone(),
                xp: stored.record.xp,
                level: stored.record.level,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryLedger;
    use crate::error::LedgerError;
    use crate::ledger::LedgerStore;
    use crate::model::leveling::UserId;

    fn user(id: u64) -> UserId {
        UserId::from_snowflake(id)
    }

    #[tokio::test]
    async fn missing_user_reads_as_zero_without_materializing() {
        let ledger = MemoryLedger::new();
        let record = ledger.get(&user(1)).await.unwrap();

        assert_eq!((record.xp, record.level, record.total_voice_seconds), (0, 1, 0));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn add_xp_reports_level_ups() {
        let ledger = MemoryLedger::new();
        ledger.add_xp(&user(1), 80, 1.0).await.unwrap();

        let grant = ledger.add_xp(&user(1), 250, 1.0).await.unwrap();
        assert!(grant.leveled_up);
        assert_eq!((grant.xp, grant.level, grant.previous_level), (30, 3, 1));
        assert_eq!(grant.granted, 250);

        let quiet = ledger.add_xp(&user(1), 5, 1.0).await.unwrap();
        assert!(!quiet.leveled_up);
    }

    #[tokio::test]
    async fn duplicate_calls_double_count() {
        let ledger = MemoryLedger::new();
        ledger.add_voice_time(&user(3), 40).await.unwrap();
        let total = ledger.add_voice_time(&user(3), 40).await.unwrap();

        assert_eq!(total, 80);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn leaderboard_is_limited_and_ordered() {
        let ledger = MemoryLedger::new();
        ledger.add_xp(&user(1), 10, 1.0).await.unwrap();
        ledger.add_xp(&user(2), 50, 1.0).await.unwrap();
        ledger.add_xp(&user(3), 10, 1.0).await.unwrap();
        ledger.add_xp(&user(4), 30, 1.0).await.unwrap();

        let top = ledger.leaderboard(3).await.unwrap();
        let ids: Vec<_> = top.iter().map(|entry| entry.user_id.clone()).collect();

        assert_eq!(ids, vec![user(2), user(4), user(1)]);
        assert!(top.windows(2).all(|pair| pair[0].xp >= pair[1].xp));
        assert!(ledger.leaderboard(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let ledger = MemoryLedger::new();
        ledger.set_unavailable(true);

        let err = ledger.add_xp(&user(1), 5, 1.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));

        ledger.set_unavailable(false);
        assert!(ledger.add_xp(&user(1), 5, 1.0).await.is_ok());
    }
}

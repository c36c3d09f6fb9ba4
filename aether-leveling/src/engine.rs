use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use aether_database::{LeaderboardEntry, LedgerResult, LedgerStore, UserId, UserRecord, XpGrant};

use crate::accrual::{AccrualRules, elapsed_secs};
use crate::roles::MultiplierSource;
use crate::session::SessionTracker;

const LEVEL_UP_CHANNEL_CAPACITY: usize = 64;

/// Emitted whenever a grant raises a user's level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelUp {
    pub user_id: UserId,
    pub level: u64,
}

/// Outcome of one reconciliation sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Sessions that received voice xp.
    pub granted: usize,
    /// Sessions whose window was settled and restarted.
    pub reset: usize,
    /// Sessions whose window is below the threshold or has no speaking time.
    pub skipped: usize,
    /// Ledger writes that failed and will be retried next tick.
    pub failures: usize,
    /// Deferred voice credits that were committed this tick.
    pub credits_retried: usize,
}

/// Applies accrual rules to incoming events and persists the result.
///
/// The engine owns no session state: callers pass the tracker in, holding
/// its lock for the duration of the call.
#[derive(Clone, Debug)]
pub struct ActivityEngine {
    ledger: Arc<dyn LedgerStore>,
    rules: AccrualRules,
    level_ups: broadcast::Sender<LevelUp>,
}

impl ActivityEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, rules: AccrualRules) -> Self {
        let (level_ups, _) = broadcast::channel(LEVEL_UP_CHANNEL_CAPACITY);
        Self {
            ledger,
            rules,
            level_ups,
        }
    }

    pub fn rules(&self) -> &AccrualRules {
        &self.rules
    }

    pub fn subscribe_level_ups(&self) -> broadcast::Receiver<LevelUp> {
        self.level_ups.subscribe()
    }

    /// Grant the flat message xp. Role multipliers do not apply to messages.
    pub async fn on_message(&self, user_id: &UserId) -> LedgerResult<XpGrant> {
        let grant = self
            .ledger
            .add_xp(user_id, self.rules.message_grant(), 1.0)
            .await?;
        self.observe(&grant);
        Ok(grant)
    }

    /// Open a voice session. Joining while already active changes nothing.
    pub fn on_voice_join(
        &self,
        sessions: &mut SessionTracker,
        user_id: &UserId,
        now: u64,
        muted: bool,
    ) -> bool {
        let opened = sessions.join(user_id, now, muted);
        if opened {
            debug!(user_id = %user_id, "voice session opened");
        } else {
            sessions.set_muted(user_id, muted);
        }
        opened
    }

    /// Close a voice session and credit its full wall time, speaking or not.
    ///
    /// Returns the seconds credited, or `None` when no session was open. If the
    /// ledger write fails the seconds are deferred to the next reconciliation tick.
    pub async fn on_voice_leave(
        &self,
        sessions: &mut SessionTracker,
        user_id: &UserId,
        now: u64,
    ) -> Option<u64> {
        let session = sessions.leave(user_id)?;
        let elapsed = elapsed_secs(session.started_at, now);

        match self.ledger.add_voice_time(user_id, elapsed).await {
            Ok(total) => {
                debug!(user_id = %user_id, elapsed, total, "voice session closed");
            }
            Err(err) => {
                error!(?err, user_id = %user_id, elapsed, "failed to commit voice time; deferring");
                sessions.defer_voice_credit(user_id, elapsed);
            }
        }

        Some(elapsed)
    }

    /// Close every open session whose user is not in `present`, a fresh view of
    /// who is in voice (e.g. after a gateway reconnect). Returns the users closed.
    pub async fn close_absent_sessions(
        &self,
        sessions: &mut SessionTracker,
        present: &HashSet<UserId>,
        now: u64,
    ) -> Vec<UserId> {
        let absent = sessions.absent_from(present);
        for user_id in &absent {
            self.on_voice_leave(sessions, user_id, now).await;
        }
        absent
    }

    pub fn on_speaking_tick(
        &self,
        sessions: &mut SessionTracker,
        user_id: &UserId,
        delta_secs: u64,
    ) -> bool {
        sessions.add_speaking(user_id, delta_secs)
    }

    /// Settle every open session whose window reached the threshold with some
    /// speaking time in it.
    ///
    /// Such windows are restarted even when the floored grant is zero. Windows
    /// below the threshold or without speaking are left alone. A failed ledger
    /// write keeps the window so the next tick retries it.
    pub async fn reconcile(
        &self,
        sessions: &mut SessionTracker,
        multipliers: &dyn MultiplierSource,
        now: u64,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (user_id, seconds) in sessions.take_deferred_credits() {
            match self.ledger.add_voice_time(&user_id, seconds).await {
                Ok(_) => report.credits_retried += 1,
                Err(err) => {
                    warn!(?err, user_id = %user_id, seconds, "deferred voice credit still failing");
                    sessions.defer_voice_credit(&user_id, seconds);
                    report.failures += 1;
                }
            }
        }

        for user_id in sessions.active_users() {
            let Some(session) = sessions.get(&user_id) else {
                continue;
            };

            let window = elapsed_secs(session.started_at, now);
            // A silent window keeps accumulating until the member speaks or leaves.
            if !self.rules.window_is_due(window) || session.speaking_secs == 0 {
                report.skipped += 1;
                continue;
            }

            let amount = self.rules.voice_grant(window, session.speaking_secs);
            if amount > 0 {
                let multiplier = multipliers.multiplier_for(&user_id).await;
                match self.ledger.add_xp(&user_id, amount, multiplier).await {
                    Ok(grant) => {
                        debug!(
                            user_id = %user_id,
                            window,
                            granted = grant.granted,
                            multiplier,
                            "voice xp granted"
                        );
                        self.observe(&grant);
                        report.granted += 1;
                    }
                    Err(err) => {
                        error!(?err, user_id = %user_id, amount, "failed to grant voice xp");
                        report.failures += 1;
                        continue;
                    }
                }
            }

            if let Some(session) = sessions.get_mut(&user_id) {
                session.reset_window(now);
                report.reset += 1;
            }
        }

        report
    }

    pub async fn query_user(&self, user_id: &UserId) -> LedgerResult<UserRecord> {
        self.ledger.get(user_id).await
    }

    pub async fn query_leaderboard(&self, limit: usize) -> LedgerResult<Vec<LeaderboardEntry>> {
        self.ledger.leaderboard(limit).await
    }

    fn observe(&self, grant: &XpGrant) {
        if !grant.leveled_up {
            return;
        }

        info!(user_id = %grant.user_id, level = grant.level, "user leveled up");
        // No receivers just means nobody is announcing.
        let _ = self.level_ups.send(LevelUp {
            user_id: grant.user_id.clone(),
            level: grant.level,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;

    use aether_database::{LedgerStore, MemoryLedger, UserId};

    use super::{ActivityEngine, LevelUp};
    use crate::accrual::AccrualRules;
    use crate::roles::{FlatMultiplier, MultiplierSource, RoleMultiplierTable};
    use crate::session::SessionTracker;

    struct RolesByUser {
        table: RoleMultiplierTable,
        roles: HashMap<UserId, Vec<&'static str>>,
    }

    #[async_trait]
    impl MultiplierSource for RolesByUser {
        async fn multiplier_for(&self, user_id: &UserId) -> f64 {
            let roles = self.roles.get(user_id).cloned().unwrap_or_default();
            self.table.multiplier_for(roles)
        }
    }

    fn setup() -> (Arc<MemoryLedger>, ActivityEngine, SessionTracker) {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = ActivityEngine::new(ledger.clone(), AccrualRules::default());
        (ledger, engine, SessionTracker::new())
    }

    fn user(id: u64) -> UserId {
        UserId::from_snowflake(id)
    }

    #[tokio::test]
    async fn messages_grant_flat_xp() {
        let (ledger, engine, _) = setup();

        engine.on_message(&user(1)).await.unwrap();
        engine.on_message(&user(1)).await.unwrap();

        assert_eq!(ledger.get(&user(1)).await.unwrap().xp, 10);
    }

    #[tokio::test]
    async fn leave_credits_wall_time_without_speaking() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 1_000, false);
        let credited = engine.on_voice_leave(&mut sessions, &user(1), 1_045).await;

        assert_eq!(credited, Some(45));
        let record = ledger.get(&user(1)).await.unwrap();
        assert_eq!(record.total_voice_seconds, 45);
        assert_eq!(record.xp, 0);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn snapshot_closes_sessions_missing_from_voice() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.on_voice_join(&mut sessions, &user(2), 100, false);
        let present = HashSet::from([user(1)]);

        let closed = engine.close_absent_sessions(&mut sessions, &present, 400).await;

        assert_eq!(closed, vec![user(2)]);
        assert!(sessions.is_active(&user(1)));
        assert!(!sessions.is_active(&user(2)));
        assert_eq!(ledger.get(&user(2)).await.unwrap().total_voice_seconds, 300);
        assert_eq!(ledger.get(&user(1)).await.unwrap().total_voice_seconds, 0);
    }

    #[tokio::test]
    async fn leave_without_session_is_ignored() {
        let (ledger, engine, mut sessions) = setup();

        assert_eq!(engine.on_voice_leave(&mut sessions, &user(1), 50).await, None);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn leave_with_clock_skew_credits_nothing() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 2_000, false);
        let credited = engine.on_voice_leave(&mut sessions, &user(1), 1_000).await;

        assert_eq!(credited, Some(0));
        assert_eq!(ledger.get(&user(1)).await.unwrap().total_voice_seconds, 0);
    }

    #[tokio::test]
    async fn reconcile_grants_and_resets_due_windows() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.on_speaking_tick(&mut sessions, &user(1), 100);

        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 200).await;

        assert_eq!(report.granted, 1);
        assert_eq!(report.reset, 1);
        assert_eq!(ledger.get(&user(1)).await.unwrap().xp, 5);

        let session = sessions.get(&user(1)).unwrap();
        assert_eq!((session.started_at, session.speaking_secs), (200, 0));
    }

    #[tokio::test]
    async fn reconcile_leaves_young_windows_alone() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.on_speaking_tick(&mut sessions, &user(1), 90);

        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 100).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.reset, 0);
        assert!(ledger.is_empty());
        let session = sessions.get(&user(1)).unwrap();
        assert_eq!((session.started_at, session.speaking_secs), (0, 90));
    }

    #[tokio::test]
    async fn silent_due_window_is_left_untouched() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 400).await;

        assert_eq!((report.granted, report.reset, report.skipped), (0, 0, 1));
        assert!(ledger.is_empty());
        assert_eq!(sessions.get(&user(1)).unwrap().started_at, 0);
    }

    #[tokio::test]
    async fn silent_session_spanning_a_tick_credits_full_time_on_leave() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.reconcile(&mut sessions, &FlatMultiplier, 200).await;
        let credited = engine.on_voice_leave(&mut sessions, &user(1), 600).await;

        assert_eq!(credited, Some(600));
        let record = ledger.get(&user(1)).await.unwrap();
        assert_eq!((record.total_voice_seconds, record.xp), (600, 0));
    }

    #[tokio::test]
    async fn speaking_after_a_silent_tick_is_measured_over_the_whole_window() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.reconcile(&mut sessions, &FlatMultiplier, 180).await;
        engine.on_speaking_tick(&mut sessions, &user(1), 100);
        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 360).await;

        assert_eq!((report.granted, report.reset), (1, 1));
        // floor(100 / 360 * 10)
        assert_eq!(ledger.get(&user(1)).await.unwrap().xp, 2);
        assert_eq!(sessions.get(&user(1)).unwrap().started_at, 360);
    }

    #[tokio::test]
    async fn speaking_window_with_zero_grant_still_resets() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.on_speaking_tick(&mut sessions, &user(1), 20);
        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 300).await;

        assert_eq!((report.granted, report.reset), (0, 1));
        assert!(ledger.is_empty());
        let session = sessions.get(&user(1)).unwrap();
        assert_eq!((session.started_at, session.speaking_secs), (300, 0));
    }

    #[tokio::test]
    async fn voice_xp_uses_highest_role_multiplier() {
        let (ledger, engine, mut sessions) = setup();
        let multipliers = RolesByUser {
            table: RoleMultiplierTable::default(),
            roles: HashMap::from([(user(1), vec!["VIP", "Moderator"])]),
        };

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.on_speaking_tick(&mut sessions, &user(1), 180);
        engine.reconcile(&mut sessions, &multipliers, 180).await;

        assert_eq!(ledger.get(&user(1)).await.unwrap().xp, 20);
    }

    #[tokio::test]
    async fn messages_ignore_role_multipliers() {
        let (ledger, engine, _) = setup();

        let grant = engine.on_message(&user(1)).await.unwrap();

        assert_eq!(grant.granted, 5);
        assert_eq!(ledger.get(&user(1)).await.unwrap().xp, 5);
    }

    #[tokio::test]
    async fn failed_grant_keeps_window_for_retry() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        engine.on_speaking_tick(&mut sessions, &user(1), 100);

        ledger.set_unavailable(true);
        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 200).await;
        assert_eq!((report.failures, report.reset), (1, 0));
        assert_eq!(sessions.get(&user(1)).unwrap().started_at, 0);

        ledger.set_unavailable(false);
        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 400).await;
        assert_eq!(report.granted, 1);
        // 100 of 400 seconds speaking.
        assert_eq!(ledger.get(&user(1)).await.unwrap().xp, 2);
    }

    #[tokio::test]
    async fn failed_leave_is_retried_by_reconcile() {
        let (ledger, engine, mut sessions) = setup();

        engine.on_voice_join(&mut sessions, &user(1), 0, false);
        ledger.set_unavailable(true);
        engine.on_voice_leave(&mut sessions, &user(1), 90).await;
        assert_eq!(sessions.deferred_credit(&user(1)), Some(90));

        ledger.set_unavailable(false);
        let report = engine.reconcile(&mut sessions, &FlatMultiplier, 100).await;

        assert_eq!(report.credits_retried, 1);
        assert_eq!(sessions.deferred_credit(&user(1)), None);
        assert_eq!(ledger.get(&user(1)).await.unwrap().total_voice_seconds, 90);
    }

    #[tokio::test]
    async fn level_ups_are_broadcast() {
        let (ledger, engine, _) = setup();
        let mut level_ups = engine.subscribe_level_ups();

        ledger.add_xp(&user(1), 95, 1.0).await.unwrap();
        engine.on_message(&user(1)).await.unwrap();

        assert_eq!(
            level_ups.try_recv().unwrap(),
            LevelUp {
                user_id: user(1),
                level: 2
            }
        );
    }

    #[tokio::test]
    async fn queries_read_through_the_ledger() {
        let (_, engine, _) = setup();

        engine.on_message(&user(1)).await.unwrap();
        engine.on_message(&user(2)).await.unwrap();
        engine.on_message(&user(2)).await.unwrap();

        assert_eq!(engine.query_user(&user(2)).await.unwrap().xp, 10);
        let top = engine.query_leaderboard(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].user_id, user(2));
    }
}

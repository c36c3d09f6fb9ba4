use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::accrual::now_unix_secs;
use crate::engine::ActivityEngine;
use crate::roles::MultiplierSource;
use crate::session::SharedSessions;

/// Run `ActivityEngine::reconcile` every `period` until the task is aborted.
///
/// The session lock is held for the whole sweep, so voice handlers wait for it.
pub fn spawn_reconciliation(
    engine: ActivityEngine,
    sessions: SharedSessions,
    multipliers: Arc<dyn MultiplierSource>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be due yet.
        interval.tick().await;

        info!(period_secs = period.as_secs(), "voice reconciliation started");

        loop {
            interval.tick().await;

            let mut tracker = sessions.lock().await;
            let report = engine
                .reconcile(&mut tracker, multipliers.as_ref(), now_unix_secs())
                .await;
            let open_sessions = tracker.len();
            drop(tracker);

            if report.granted > 0 || report.failures > 0 || report.credits_retried > 0 {
                info!(
                    open_sessions,
                    granted = report.granted,
                    reset = report.reset,
                    failures = report.failures,
                    credits_retried = report.credits_retried,
                    "voice reconciliation tick"
                );
            } else {
                debug!(
                    open_sessions,
                    reset = report.reset,
                    skipped = report.skipped,
                    "voice reconciliation tick"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use aether_database::{LedgerStore, MemoryLedger, UserId};

    use super::spawn_reconciliation;
    use crate::accrual::{AccrualRules, now_unix_secs};
    use crate::engine::ActivityEngine;
    use crate::roles::FlatMultiplier;
    use crate::session::shared_sessions;

    #[tokio::test(start_paused = true)]
    async fn ticks_settle_due_sessions() {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = ActivityEngine::new(ledger.clone(), AccrualRules::default());
        let sessions = shared_sessions();
        let user = UserId::from_snowflake(1);

        {
            let mut tracker = sessions.lock().await;
            // Backdate the window so the first real tick finds it due.
            engine.on_voice_join(&mut tracker, &user, now_unix_secs() - 600, false);
            engine.on_speaking_tick(&mut tracker, &user, 10_000);
        }

        let handle = spawn_reconciliation(
            engine.clone(),
            sessions.clone(),
            Arc::new(FlatMultiplier),
            Duration::from_secs(180),
        );

        tokio::time::sleep(Duration::from_secs(181)).await;
        handle.abort();

        assert_eq!(ledger.get(&user).await.unwrap().xp, 10);
        assert_eq!(sessions.lock().await.get(&user).unwrap().speaking_secs, 0);
    }
}

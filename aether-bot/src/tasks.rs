use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use aether_core::Data;
use aether_database::UserId;
use aether_leveling::LevelUp;
use aether_utils::embed::styled_embed;

/// Credit `period` seconds of speaking time to every audible member each `period`.
///
/// Bots receive no speaking signal from the gateway, so being unmuted and
/// undeafened in a channel stands in for speaking.
pub fn spawn_speaking_sampler(data: Data, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let delta_secs = period.as_secs();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        info!(period_secs = delta_secs, "speaking sampler started");

        loop {
            interval.tick().await;

            let audible: Vec<UserId> = data.audible_members.read().await.iter().cloned().collect();
            if audible.is_empty() {
                continue;
            }

            let mut sessions = data.sessions.lock().await;
            for user_id in &audible {
                data.engine.on_speaking_tick(&mut sessions, user_id, delta_secs);
            }
        }
    })
}

/// Post an embed to `channel_id` for every level-up the engine reports.
pub fn spawn_level_up_announcer(
    http: Arc<serenity::Http>,
    mut level_ups: broadcast::Receiver<LevelUp>,
    channel_id: serenity::ChannelId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let level_up = match level_ups.recv().await {
                Ok(level_up) => level_up,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "level-up announcer fell behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let embed = styled_embed(
                "Level up!",
                format!("<@{}> reached **Level {}**!", level_up.user_id, level_up.level),
                None,
            );

            if let Err(source) = channel_id
                .send_message(&http, serenity::CreateMessage::new().embed(embed))
                .await
            {
                warn!(?source, user_id = %level_up.user_id, "failed to announce level up");
            }
        }
    })
}

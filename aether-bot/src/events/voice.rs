use std::collections::HashSet;

use poise::serenity_prelude as serenity;
use tracing::{debug, info};

use aether_core::Data;
use aether_database::UserId;
use aether_leveling::accrual::now_unix_secs;

/// What the tracker needs to know about one voice state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Presence {
    in_channel: bool,
    muted: bool,
    deafened: bool,
}

impl Presence {
    fn from_state(state: &serenity::VoiceState) -> Self {
        Self {
            in_channel: state.channel_id.is_some(),
            muted: state.self_mute || state.mute,
            deafened: state.self_deaf || state.deaf,
        }
    }

    /// Present and able to talk; the speaking sampler credits these members.
    fn is_audible(self) -> bool {
        self.in_channel && !self.muted && !self.deafened
    }
}

/// Route a voice state change to the session tracker.
///
/// Only the new state matters: a channel means join (a no-op for an open
/// session, so channel moves keep the session), no channel means leave.
pub async fn handle_voice_state_update(data: &Data, state: &serenity::VoiceState) {
    if state.guild_id.map(|id| id.get()) != Some(data.guild_id) {
        return;
    }

    if state.member.as_ref().is_some_and(|member| member.user.bot) {
        return;
    }

    let user_id = UserId::from_snowflake(state.user_id.get());
    apply_presence(data, &user_id, Presence::from_state(state)).await;
}

/// Sync sessions with the guild's voice state when it becomes available.
///
/// Members already in voice get a session. Sessions for members no longer in
/// voice (missed while disconnected) are closed and their time credited.
pub async fn seed_voice_sessions(data: &Data, guild: &serenity::Guild) {
    if guild.id.get() != data.guild_id {
        return;
    }

    let mut present = Vec::new();
    for (member_id, state) in &guild.voice_states {
        let is_bot = guild
            .members
            .get(member_id)
            .is_some_and(|member| member.user.bot);
        let presence = Presence::from_state(state);

        if !is_bot && presence.in_channel {
            present.push((UserId::from_snowflake(member_id.get()), presence));
        }
    }

    let present_ids: HashSet<UserId> = present.iter().map(|(user_id, _)| user_id.clone()).collect();
    let closed = {
        let mut sessions = data.sessions.lock().await;
        data.engine
            .close_absent_sessions(&mut sessions, &present_ids, now_unix_secs())
            .await
    };

    data.audible_members
        .write()
        .await
        .retain(|user_id| present_ids.contains(user_id));

    for (user_id, presence) in &present {
        apply_presence(data, user_id, *presence).await;
    }

    info!(
        seeded = present.len(),
        closed = closed.len(),
        "voice sessions synced from guild state"
    );
}

async fn apply_presence(data: &Data, user_id: &UserId, presence: Presence) {
    let now = now_unix_secs();

    {
        let mut sessions = data.sessions.lock().await;
        if presence.in_channel {
            data.engine
                .on_voice_join(&mut sessions, user_id, now, presence.muted);
        } else if let Some(elapsed) = data.engine.on_voice_leave(&mut sessions, user_id, now).await {
            debug!(user_id = %user_id, elapsed, "member left voice");
        }
    }

    let mut audible = data.audible_members.write().await;
    if presence.is_audible() {
        audible.insert(user_id.clone());
    } else {
        audible.remove(user_id);
    }
}

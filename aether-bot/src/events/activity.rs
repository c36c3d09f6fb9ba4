use poise::serenity_prelude as serenity;
use tracing::error;

use aether_core::Data;
use aether_database::UserId;

/// Grant message xp to the author of a qualifying guild message.
/// Commands count as messages.
pub async fn handle_message_xp(data: &Data, message: &serenity::Message) {
    // Ignore bots and webhooks.
    if message.author.bot || message.webhook_id.is_some() {
        return;
    }

    if message.guild_id.map(|id| id.get()) != Some(data.guild_id) {
        return;
    }

    let user_id = UserId::from_snowflake(message.author.id.get());
    if let Err(source) = data.engine.on_message(&user_id).await {
        error!(?source, user_id = %user_id, "failed to grant message xp");
    }
}

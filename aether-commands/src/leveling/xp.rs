use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use aether_core::{Context, Error};
use aether_database::{UserId, UserRecord};
use aether_utils::embed::styled_embed;
use aether_utils::formatting::{format_voice_duration, progress_bar};

pub const META: CommandMeta = CommandMeta {
    name: "xp",
    desc: "Show a user's level, xp and voice time.",
    category: "leveling",
    usage: "!xp [user]",
};

const PROGRESS_BAR_WIDTH: usize = 12;

#[poise::command(prefix_command, slash_command, category = "Leveling", aliases("rank"))]
pub async fn xp(
    ctx: Context<'_>,
    #[description = "The user to check"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let record = ctx
        .data()
        .engine
        .query_user(&UserId::from_snowflake(user.id.get()))
        .await?;

    let display_name = match ctx.guild_id() {
        Some(guild_id) => user.nick_in(ctx.serenity_context(), guild_id).await,
        None => None,
    }
    .unwrap_or_else(|| user.global_name.clone().unwrap_or_else(|| user.name.clone()));

    let embed = styled_embed(
        format!("{}'s progress", display_name),
        progress_description(&display_name, &record),
        None,
    )
    .thumbnail(user.face());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn progress_description(display_name: &str, record: &UserRecord) -> String {
    let needed = record.xp_to_next_level();
    format!(
        "{name} is Level **{level}** with **{xp}** XP and has spent **{voice}** in voice channels.\n\n{bar} {xp}/{needed}",
        name = display_name.replace('@', "@\u{200B}"),
        level = record.level,
        xp = record.xp,
        voice = format_voice_duration(record.total_voice_seconds),
        bar = progress_bar(record.xp, needed, PROGRESS_BAR_WIDTH),
        needed = needed,
    )
}

use poise::serenity_prelude as serenity;
use tracing::debug;

use crate::CommandMeta;
use aether_core::{Context, Error};
use aether_database::LeaderboardEntry;
use aether_utils::embed::styled_embed;
use aether_utils::formatting::{fallback_user_label, rank_label};

pub const META: CommandMeta = CommandMeta {
    name: "leaderboard",
    desc: "Show the top users by xp.",
    category: "leveling",
    usage: "!leaderboard [limit]",
};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 25;

#[poise::command(prefix_command, slash_command, category = "Leveling", aliases("lb", "top"))]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "How many users to show (1-25)"] limit: Option<u32>,
) -> Result<(), Error> {
    let limit = clamp_limit(limit);
    let entries = ctx.data().engine.query_leaderboard(limit).await?;

    let mut names = Vec::with_capacity(entries.len());
    for entry in &entries {
        names.push(resolve_name(ctx, entry).await);
    }

    let embed = styled_embed(
        "🏆 XP Leaderboard",
        leaderboard_description(&entries, &names),
        Some(&format!("Top {}", limit)),
    );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn clamp_limit(limit: Option<u32>) -> usize {
    limit
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT)
}

async fn resolve_name(ctx: Context<'_>, entry: &LeaderboardEntry) -> String {
    let fallback = || fallback_user_label(entry.user_id.as_str());

    let (Some(guild_id), Some(snowflake)) = (ctx.guild_id(), entry.user_id.snowflake()) else {
        return fallback();
    };

    match guild_id
        .member(ctx.serenity_context(), serenity::UserId::new(snowflake))
        .await
    {
        Ok(member) => member.display_name().to_owned(),
        Err(err) => {
            debug!(?err, user_id = %entry.user_id, "leaderboard member lookup failed");
            fallback()
        }
    }
}

fn leaderboard_description(entries: &[LeaderboardEntry], names: &[String]) -> String {
    if entries.is_empty() {
        return "No activity recorded yet.".to_owned();
    }

    entries
        .iter()
        .zip(names)
        .enumerate()
        .map(|(index, (entry, name))| {
            format!(
                "{} **{}** - Level {}, {} XP",
                rank_label(index + 1),
                name.replace('@', "@\u{200B}"),
                entry.level,
                entry.xp
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{clamp_limit, leaderboard_description};
    use aether_database::{LeaderboardEntry, UserId};

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(500)), 25);
    }

    #[test]
    fn renders_ranked_rows() {
        let entries = vec![
            LeaderboardEntry {
                user_id: UserId::from_snowflake(1),
                xp: 90,
                level: 4,
            },
            LeaderboardEntry {
                user_id: UserId::from_snowflake(2),
                xp: 40,
                level: 2,
            },
        ];
        let names = vec!["Ada".to_owned(), "User 2".to_owned()];

        assert_eq!(
            leaderboard_description(&entries, &names),
            "🥇 **Ada** - Level 4, 90 XP\n🥈 **User 2** - Level 2, 40 XP"
        );
        assert_eq!(leaderboard_description(&[], &[]), "No activity recorded yet.");
    }
}

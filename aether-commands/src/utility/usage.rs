use aether_core::{Context, Error};

use crate::{COMMANDS, CommandMeta};

pub const META: CommandMeta = CommandMeta {
    name: "usage",
    desc: "Show usage syntax for a specific command.",
    category: "utility",
    usage: "!usage <command>",
};

#[poise::command(prefix_command, slash_command, category = "Utility")]
pub async fn usage(
    ctx: Context<'_>,
    #[description = "Command name"] command: Option<String>,
) -> Result<(), Error> {
    let reply = match command.as_deref() {
        Some(raw_name) => usage_reply(raw_name),
        None => format!("Usage: `{}`", META.usage),
    };

    ctx.say(reply).await?;
    Ok(())
}

fn usage_reply(raw_name: &str) -> String {
    let lookup = raw_name
        .trim()
        .trim_start_matches(aether_utils::COMMAND_PREFIX)
        .to_ascii_lowercase();

    match COMMANDS.iter().find(|command| command.name == lookup) {
        Some(command) => format!("Usage: `{}`", command.usage),
        None => format!("Unknown command: `{}`", lookup),
    }
}

#[cfg(test)]
mod tests {
    use super::usage_reply;

    #[test]
    fn resolves_known_commands_with_or_without_prefix() {
        assert_eq!(usage_reply("xp"), "Usage: `!xp [user]`");
        assert_eq!(usage_reply(" !Leaderboard "), "Usage: `!leaderboard [limit]`");
        assert_eq!(usage_reply("dance"), "Unknown command: `dance`");
    }
}

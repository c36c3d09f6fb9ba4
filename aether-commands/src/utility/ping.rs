use std::time::{Duration, Instant};

use aether_core::{Context, Error};
use tracing::warn;

use crate::CommandMeta;

pub const META: CommandMeta = CommandMeta {
    name: "ping",
    desc: "Check gateway latency and whether the xp ledger answers.",
    category: "utility",
    usage: "!ping",
};

#[poise::command(prefix_command, slash_command, category = "Utility")]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let gateway = ctx.ping().await;

    let started = Instant::now();
    let ledger = match ctx.data().engine.query_leaderboard(1).await {
        Ok(_) => Some(started.elapsed()),
        Err(err) => {
            warn!(?err, "ledger health check failed");
            None
        }
    };

    ctx.say(pong_message(gateway, ledger)).await?;
    Ok(())
}

fn pong_message(gateway: Duration, ledger: Option<Duration>) -> String {
    let ledger = match ledger {
        Some(elapsed) => format!("{} ms", elapsed.as_millis()),
        None => "unreachable".to_owned(),
    };

    format!(
        "Pong! Gateway {} ms, ledger {}.",
        gateway.as_millis(),
        ledger
    )
}

mod events;
mod roles;
mod tasks;

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tokio::sync::RwLock;
use tracing::{Metadata, debug, error, info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rustls::crypto::ring::default_provider;
use sqlx::postgres::PgPoolOptions;

use aether_core::{Data, Error};
use aether_database::{CacheService, Database, MIGRATOR};
use aether_leveling::{ActivityEngine, LevelingConfig, shared_sessions, spawn_reconciliation};

use crate::roles::GuildRoleMultipliers;

/// Gateway internals that log every heartbeat at INFO.
const NOISY_TARGETS: [&str; 2] = [
    "serenity::gateway::bridge::shard_manager",
    "serenity::gateway::bridge::shard_runner",
];

const DEFAULT_CACHE_PREFIX: &str = "aether:prod";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter_fn(keep_log_event)))
        .init();

    default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("could not install the ring crypto provider for rustls"))?;

    dotenvy::dotenv().ok();

    let token = env::var("DISCORD_TOKEN")?;
    let guild_id = env::var("DISCORD_GUILD_ID")?.trim().parse::<u64>()?;

    let db = connect_ledger().await?;

    let leveling = LevelingConfig::from_env();
    info!(
        message_xp = leveling.rules.message_xp,
        voice_window_secs = leveling.rules.voice_window_secs,
        voice_xp_scale = leveling.rules.voice_xp_scale,
        reconcile_interval_secs = leveling.reconcile_interval.as_secs(),
        speaking_sample_secs = leveling.speaking_sample_interval.as_secs(),
        multiplier_roles = leveling.role_multipliers.len(),
        "leveling configured"
    );

    let announce_channel = env_id("LEVEL_UP_CHANNEL_ID");
    if announce_channel.is_none() {
        info!("level-up announcements off (set LEVEL_UP_CHANNEL_ID to post them)");
    }

    let engine = ActivityEngine::new(Arc::new(db), leveling.rules);

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: aether_commands::commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handle_event(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(aether_utils::COMMAND_PREFIX.to_string()),
                mention_as_prefix: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!(user = %ready.user.name, "gateway ready");

                let guild = serenity::GuildId::new(guild_id);
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild)
                    .await?;

                let data = Data {
                    engine,
                    sessions: shared_sessions(),
                    audible_members: Arc::new(RwLock::new(HashSet::new())),
                    guild_id,
                };

                let multipliers = GuildRoleMultipliers::new(
                    ctx.cache.clone(),
                    ctx.http.clone(),
                    guild,
                    leveling.role_multipliers.clone(),
                );
                spawn_reconciliation(
                    data.engine.clone(),
                    data.sessions.clone(),
                    Arc::new(multipliers),
                    leveling.reconcile_interval,
                );
                tasks::spawn_speaking_sampler(data.clone(), leveling.speaking_sample_interval);

                if let Some(channel_id) = announce_channel {
                    tasks::spawn_level_up_announcer(
                        ctx.http.clone(),
                        data.engine.subscribe_level_ups(),
                        serenity::ChannelId::new(channel_id),
                    );
                }

                Ok(data)
            })
        })
        .build();

    info!(guild_id, "connecting to discord");

    serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?
        .start()
        .await?;

    Ok(())
}

fn keep_log_event(metadata: &Metadata<'_>) -> bool {
    *metadata.level() <= tracing::Level::INFO
        && !NOISY_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target))
}

/// Connect to Postgres, attach the optional Redis cache and apply pending migrations.
async fn connect_ledger() -> anyhow::Result<Database> {
    let database_url = env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    info!("ledger database connected");

    let db = Database::with_cache(pool, cache_from_env().await);

    if env_flag("AUTO_RUN_MIGRATIONS", true) {
        MIGRATOR.run(db.pool()).await?;
        info!("ledger migrations applied");
    } else {
        info!("skipping migrations (AUTO_RUN_MIGRATIONS=false)");
    }

    Ok(db)
}

/// Any Redis problem degrades to a disabled cache; the ledger never depends on it.
async fn cache_from_env() -> CacheService {
    let prefix = env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| DEFAULT_CACHE_PREFIX.to_owned());

    if !env_flag("REDIS_ENABLED", false) {
        info!("redis cache off (set REDIS_ENABLED=true to enable)");
        return CacheService::disabled(prefix);
    }

    let Ok(redis_url) = env::var("REDIS_URL") else {
        warn!(key_prefix = %prefix, "REDIS_ENABLED is set without REDIS_URL; reading straight from the ledger");
        return CacheService::disabled(prefix);
    };

    let cache = match CacheService::redis(&redis_url, prefix.clone()) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(?err, key_prefix = %prefix, "redis cache unavailable; reading straight from the ledger");
            return CacheService::disabled(prefix);
        }
    };

    match cache.ping().await {
        Ok(()) => info!(key_prefix = %prefix, "redis cache enabled"),
        Err(err) => warn!(?err, "redis ping failed; cache misses will fall through to the ledger"),
    }

    cache
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// A non-zero Discord snowflake, if the variable is set and parses.
fn env_id(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            warn!(key, value = %raw, "ignoring malformed snowflake");
            None
        }
    }
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(?error, command = %ctx.command().qualified_name, "leveling command failed");

            let embed = aether_utils::embed::styled_embed(
                "Something went wrong",
                "The xp ledger could not be read right now. Try again in a moment.",
                None,
            );
            if let Err(err) = ctx
                .send(poise::CreateReply::default().ephemeral(true).embed(embed))
                .await
            {
                warn!(?err, "could not report command failure");
            }
        }
        poise::FrameworkError::ArgumentParse { ctx, input, .. } => {
            let usage = format!(
                "Usage: `{}{}`",
                aether_utils::COMMAND_PREFIX,
                ctx.command().qualified_name
            );
            let reply = match input {
                Some(input) => format!("Could not understand `{}`.\n{}", input, usage),
                None => format!("An argument is missing.\n{}", usage),
            };

            if let Err(err) = ctx.say(reply).await {
                warn!(?err, "could not report argument error");
            }
        }
        poise::FrameworkError::UnknownCommand { .. } => {
            debug!("ignoring unknown prefix command");
        }
        other => {
            error!(?other, "framework error");
        }
    }
}

async fn handle_event(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            events::activity::handle_message_xp(data, new_message).await;
        }
        serenity::FullEvent::VoiceStateUpdate { new, .. } => {
            events::voice::handle_voice_state_update(data, new).await;
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            events::voice::seed_voice_sessions(data, guild).await;
        }
        _ => {}
    }

    Ok(())
}

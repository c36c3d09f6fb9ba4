use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use aether_database::UserId;
use aether_leveling::{ActivityEngine, SharedSessions};

pub type Error = anyhow::Error;

#[derive(Clone, Debug)]
pub struct Data {
    pub engine: ActivityEngine,
    pub sessions: SharedSessions,
    /// Members in voice that are neither muted nor deafened; the speaking sampler credits them.
    pub audible_members: Arc<RwLock<HashSet<UserId>>>,
    /// The only guild whose activity is tracked.
    pub guild_id: u64,
}

pub type Context<'a> = poise::Context<'a, Data, Error>;

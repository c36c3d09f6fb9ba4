use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use tracing::warn;

use aether_database::UserId;
use aether_leveling::roles::BASE_MULTIPLIER;
use aether_leveling::{MultiplierSource, RoleMultiplierTable};

/// Resolves voice multipliers from a member's live roles in the tracked guild.
pub struct GuildRoleMultipliers {
    cache: Arc<serenity::Cache>,
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
    table: RoleMultiplierTable,
}

impl GuildRoleMultipliers {
    pub fn new(
        cache: Arc<serenity::Cache>,
        http: Arc<serenity::Http>,
        guild_id: serenity::GuildId,
        table: RoleMultiplierTable,
    ) -> Self {
        Self {
            cache,
            http,
            guild_id,
            table,
        }
    }

    fn cached_role_names(&self, role_ids: &[serenity::RoleId]) -> Option<Vec<String>> {
        let guild = self.cache.guild(self.guild_id)?;
        Some(
            role_ids
                .iter()
                .filter_map(|role_id| guild.roles.get(role_id))
                .map(|role| role.name.to_string())
                .collect(),
        )
    }

    async fn role_names(&self, role_ids: &[serenity::RoleId]) -> Vec<String> {
        if let Some(names) = self.cached_role_names(role_ids) {
            return names;
        }

        match self.guild_id.roles(&self.http).await {
            Ok(roles) => role_ids
                .iter()
                .filter_map(|role_id| roles.get(role_id))
                .map(|role| role.name.to_string())
                .collect(),
            Err(source) => {
                warn!(?source, "failed to fetch guild roles; using base multiplier");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl MultiplierSource for GuildRoleMultipliers {
    async fn multiplier_for(&self, user_id: &UserId) -> f64 {
        if self.table.is_empty() {
            return BASE_MULTIPLIER;
        }

        let Some(snowflake) = user_id.snowflake() else {
            return BASE_MULTIPLIER;
        };

        let member = match self
            .guild_id
            .member((&self.cache, self.http.as_ref()), serenity::UserId::new(snowflake))
            .await
        {
            Ok(member) => member,
            Err(source) => {
                warn!(?source, user_id = %user_id, "failed to resolve member roles; using base multiplier");
                return BASE_MULTIPLIER;
            }
        };

        let names = self.role_names(&member.roles).await;
        self.table.multiplier_for(names.iter().map(String::as_str))
    }
}

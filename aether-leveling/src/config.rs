use std::env;
use std::time::Duration;

use tracing::warn;

use crate::accrual::{
    AccrualRules, DEFAULT_MESSAGE_XP, DEFAULT_VOICE_WINDOW_SECS, DEFAULT_VOICE_XP_SCALE,
};
use crate::roles::RoleMultiplierTable;

pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 180;
pub const DEFAULT_SPEAKING_SAMPLE_SECS: u64 = 15;

/// Tunables for the accrual engine and its background tasks.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelingConfig {
    pub rules: AccrualRules,
    pub reconcile_interval: Duration,
    pub speaking_sample_interval: Duration,
    pub role_multipliers: RoleMultiplierTable,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            rules: AccrualRules::default(),
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            speaking_sample_interval: Duration::from_secs(DEFAULT_SPEAKING_SAMPLE_SECS),
            role_multipliers: RoleMultiplierTable::default(),
        }
    }
}

impl LevelingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read_u64 = |key: &str, default: u64| match lookup(key) {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(key, value = %raw, default, "invalid integer setting; using default");
                default
            }),
            None => default,
        };

        let rules = AccrualRules {
            message_xp: read_u64("LEVELING_MESSAGE_XP", DEFAULT_MESSAGE_XP),
            voice_window_secs: read_u64("LEVELING_VOICE_WINDOW_SECONDS", DEFAULT_VOICE_WINDOW_SECS),
            voice_xp_scale: read_u64("LEVELING_VOICE_XP_SCALE", DEFAULT_VOICE_XP_SCALE),
        };

        let reconcile_secs = read_u64(
            "LEVELING_RECONCILE_INTERVAL_SECONDS",
            DEFAULT_RECONCILE_INTERVAL_SECS,
        )
        .max(1);
        let sample_secs = read_u64("SPEAKING_SAMPLE_SECONDS", DEFAULT_SPEAKING_SAMPLE_SECS).max(1);

        let role_multipliers = match lookup("LEVELING_ROLE_MULTIPLIERS") {
            Some(raw) => {
                let (table, rejected) = RoleMultiplierTable::parse(&raw);
                for entry in rejected {
                    warn!(entry = %entry, "skipping role multiplier (expected `Role=1.5`, at least 1.0)");
                }
                table
            }
            None => RoleMultiplierTable::default(),
        };

        Self {
            rules,
            reconcile_interval: Duration::from_secs(reconcile_secs),
            speaking_sample_interval: Duration::from_secs(sample_secs),
            role_multipliers,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::LevelingConfig;

    fn config_from(pairs: &[(&str, &str)]) -> LevelingConfig {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        LevelingConfig::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_reference_values() {
        assert_eq!(config_from(&[]), LevelingConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("LEVELING_MESSAGE_XP", "7"),
            ("LEVELING_VOICE_WINDOW_SECONDS", " 60 "),
            ("LEVELING_RECONCILE_INTERVAL_SECONDS", "0"),
            ("LEVELING_ROLE_MULTIPLIERS", "Booster=1.25"),
        ]);

        assert_eq!(config.rules.message_xp, 7);
        assert_eq!(config.rules.voice_window_secs, 60);
        assert_eq!(config.rules.voice_xp_scale, 10);
        assert_eq!(config.reconcile_interval, Duration::from_secs(1));
        assert_eq!(config.role_multipliers.get("Booster"), Some(1.25));
        assert_eq!(config.role_multipliers.get("VIP"), None);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config_from(&[("LEVELING_VOICE_XP_SCALE", "lots")]);
        assert_eq!(config.rules.voice_xp_scale, 10);
    }
}

use std::collections::HashMap;

use async_trait::async_trait;

use aether_database::UserId;

pub const BASE_MULTIPLIER: f64 = 1.0;

/// Voice xp multiplier per role name. A member holding several listed roles
/// gets the largest multiplier, never the sum.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleMultiplierTable {
    multipliers: HashMap<String, f64>,
}

impl Default for RoleMultiplierTable {
    fn default() -> Self {
        Self::empty().with_role("VIP", 1.5).with_role("Moderator", 2.0)
    }
}

impl RoleMultiplierTable {
    pub fn empty() -> Self {
        Self {
            multipliers: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>, multiplier: f64) -> Self {
        self.insert(role, multiplier);
        self
    }

    /// Register a role. Multipliers that are non-finite or below 1.0 are rejected.
    pub fn insert(&mut self, role: impl Into<String>, multiplier: f64) -> bool {
        if !multiplier.is_finite() || multiplier < BASE_MULTIPLIER {
            return false;
        }

        self.multipliers.insert(role.into(), multiplier);
        true
    }

    /// Parse `Name=1.5,Other=2` entries. Returns the table and the entries that were skipped.
    pub fn parse(raw: &str) -> (Self, Vec<String>) {
        let mut table = Self::empty();
        let mut rejected = Vec::new();

        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let parsed = entry.split_once('=').and_then(|(role, value)| {
                let role = role.trim();
                let value = value.trim().parse::<f64>().ok()?;
                (!role.is_empty()).then_some((role, value))
            });

            match parsed {
                Some((role, value)) if table.insert(role, value) => {}
                _ => rejected.push(entry.to_owned()),
            }
        }

        (table, rejected)
    }

    pub fn get(&self, role: &str) -> Option<f64> {
        self.multipliers.get(role).copied()
    }

    /// Largest multiplier among `roles`, or 1.0 when none is listed.
    pub fn multiplier_for<'a, I>(&self, roles: I) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles
            .into_iter()
            .filter_map(|role| self.get(role))
            .fold(BASE_MULTIPLIER, f64::max)
    }

    pub fn len(&self) -> usize {
        self.multipliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.multipliers.is_empty()
    }
}

/// Resolves a user's current multiplier from live role membership.
#[async_trait]
pub trait MultiplierSource: Send + Sync {
    async fn multiplier_for(&self, user_id: &UserId) -> f64;
}

/// Everyone earns at the base rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatMultiplier;

#[async_trait]
impl MultiplierSource for FlatMultiplier {
    async fn multiplier_for(&self, _user_id: &UserId) -> f64 {
        BASE_MULTIPLIER
    }
}

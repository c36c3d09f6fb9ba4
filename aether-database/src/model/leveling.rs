use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Level every user starts at.
pub const BASE_LEVEL: u64 = 1;
/// Per-level step of the xp requirement (`level * XP_PER_LEVEL`).
pub const XP_PER_LEVEL: u64 = 100;
/// Longest identifier accepted at the boundary.
pub const MAX_USER_ID_LEN: usize = 64;

/// Opaque user identifier. Discord snowflakes are stored as decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate a raw identifier: non-empty, bounded length, no whitespace or control characters.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, LedgerError> {
        let raw = raw.as_ref();
        let malformed = raw.is_empty()
            || raw.len() > MAX_USER_ID_LEN
            || raw.chars().any(|ch| ch.is_whitespace() || ch.is_control());

        if malformed {
            return Err(LedgerError::InvalidUser(raw.to_owned()));
        }

        Ok(Self(raw.to_owned()))
    }

    pub fn from_snowflake(id: u64) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form of the id when it was created from a snowflake.
    pub fn snowflake(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Xp needed to clear `level`.
pub fn xp_for_next_level(level: u64) -> u64 {
    level.max(BASE_LEVEL).saturating_mul(XP_PER_LEVEL)
}

/// `floor(amount * multiplier)`. Multipliers below 1.0 or non-finite fall back to 1.0.
pub fn effective_amount(amount: u64, multiplier: f64) -> u64 {
    let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
        multiplier
    } else {
        1.0
    };

    (amount as f64 * multiplier).floor() as u64
}

/// Durable progress for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub xp: u64,
    pub level: u64,
    pub total_voice_seconds: u64,
}

impl UserRecord {
    /// The zero record a missing row stands for.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            xp: 0,
            level: BASE_LEVEL,
            total_voice_seconds: 0,
        }
    }

    pub fn xp_to_next_level(&self) -> u64 {
        xp_for_next_level(self.level)
    }

    /// Add `amount` xp and roll the overflow into as many levels as it covers.
    /// Returns the number of levels gained.
    pub fn apply_xp(&mut self, amount: u64) -> u64 {
        self.level = self.level.max(BASE_LEVEL);
        self.xp = self.xp.saturating_add(amount);

        let mut gained = 0;
        while self.xp >= xp_for_next_level(self.level) {
            self.xp -= xp_for_next_level(self.level);
            self.level += 1;
            gained += 1;
        }

        gained
    }

    pub fn add_voice_seconds(&mut self, seconds: u64) -> u64 {
        self.total_voice_seconds = self.total_voice_seconds.saturating_add(seconds);
        self.total_voice_seconds
    }
}

/// Outcome of a single xp grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XpGrant {
    pub user_id: UserId,
    /// Effective amount after the multiplier was applied.
    pub granted: u64,
    pub xp: u64,
    pub level: u64,
    pub previous_level: u64,
    pub leveled_up: bool,
}

impl XpGrant {
    pub fn new(granted: u64, previous_level: u64, record: &UserRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            granted,
            xp: record.xp,
            level: record.level,
            previous_level,
            leveled_up: record.level > previous_level,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub xp: u64,
    pub level: u64,
}

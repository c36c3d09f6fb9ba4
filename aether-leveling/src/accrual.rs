use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Xp granted per qualifying message.
pub const DEFAULT_MESSAGE_XP: u64 = 5;
/// Minimum voice window before rolling xp is considered.
pub const DEFAULT_VOICE_WINDOW_SECS: u64 = 180;
/// Xp granted for a window spent speaking the whole time.
pub const DEFAULT_VOICE_XP_SCALE: u64 = 10;

/// Pure accrual rules. Nothing here touches storage or can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccrualRules {
    pub message_xp: u64,
    pub voice_window_secs: u64,
    pub voice_xp_scale: u64,
}

impl Default for AccrualRules {
    fn default() -> Self {
        Self {
            message_xp: DEFAULT_MESSAGE_XP,
            voice_window_secs: DEFAULT_VOICE_WINDOW_SECS,
            voice_xp_scale: DEFAULT_VOICE_XP_SCALE,
        }
    }
}

impl AccrualRules {
    /// Base xp for one message. Role multipliers never apply to it.
    pub fn message_grant(&self) -> u64 {
        self.message_xp
    }

    /// Whether a window of `window_secs` is old enough to be settled.
    pub fn window_is_due(&self, window_secs: u64) -> bool {
        window_secs >= self.voice_window_secs
    }

    /// `floor((speaking / window) * scale)` for a due window with any speaking time, else 0.
    /// Speaking time is capped at the window length.
    pub fn voice_grant(&self, window_secs: u64, speaking_secs: u64) -> u64 {
        if !self.window_is_due(window_secs) || speaking_secs == 0 || window_secs == 0 {
            return 0;
        }

        let speaking_secs = speaking_secs.min(window_secs);
        let scaled = u128::from(speaking_secs) * u128::from(self.voice_xp_scale)
            / u128::from(window_secs);

        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

/// Current wall-clock time in unix seconds; the timebase of every voice session.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Seconds between `start` and `now`. A clock that went backwards yields 0.
pub fn elapsed_secs(start: u64, now: u64) -> u64 {
    match now.checked_sub(start) {
        Some(elapsed) => elapsed,
        None => {
            warn!(start, now, "negative voice duration; clamping to zero");
            0
        }
    }
}

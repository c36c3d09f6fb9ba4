use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use aether_database::UserId;

/// Session map shared between event handlers and the reconciliation task.
/// Holders keep the lock across their ledger writes so handlers and ticks never interleave.
pub type SharedSessions = Arc<Mutex<SessionTracker>>;

pub fn shared_sessions() -> SharedSessions {
    Arc::new(Mutex::new(SessionTracker::new()))
}

/// An open voice session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceSession {
    pub user_id: UserId,
    /// Start of the current accrual window (unix seconds).
    pub started_at: u64,
    /// Informational only.
    pub muted: bool,
    pub speaking_secs: u64,
}

impl VoiceSession {
    fn open(user_id: UserId, now: u64, muted: bool) -> Self {
        Self {
            user_id,
            started_at: now,
            muted,
            speaking_secs: 0,
        }
    }

    /// Start a fresh accrual window at `now`.
    pub fn reset_window(&mut self, now: u64) {
        self.started_at = now;
        self.speaking_secs = 0;
    }
}

/// In-memory voice sessions plus voice time whose commit failed and awaits a retry.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<UserId, VoiceSession>,
    deferred_credits: HashMap<UserId, u64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session unless one is already active. Returns whether a session was opened.
    pub fn join(&mut self, user_id: &UserId, now: u64, muted: bool) -> bool {
        if self.sessions.contains_key(user_id) {
            return false;
        }

        self.sessions
            .insert(user_id.clone(), VoiceSession::open(user_id.clone(), now, muted));
        true
    }

    /// Close and return the session, if any.
    pub fn leave(&mut self, user_id: &UserId) -> Option<VoiceSession> {
        self.sessions.remove(user_id)
    }

    pub fn add_speaking(&mut self, user_id: &UserId, delta_secs: u64) -> bool {
        match self.sessions.get_mut(user_id) {
            Some(session) => {
                session.speaking_secs = session.speaking_secs.saturating_add(delta_secs);
                true
            }
            None => false,
        }
    }

    pub fn set_muted(&mut self, user_id: &UserId, muted: bool) -> bool {
        match self.sessions.get_mut(user_id) {
            Some(session) => {
                session.muted = muted;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user_id: &UserId) -> Option<&VoiceSession> {
        self.sessions.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &UserId) -> Option<&mut VoiceSession> {
        self.sessions.get_mut(user_id)
    }

    pub fn is_active(&self, user_id: &UserId) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn active_users(&self) -> Vec<UserId> {
        self.sessions.keys().cloned().collect()
    }

    /// Open sessions whose user is missing from a fresh snapshot of who is in voice.
    pub fn absent_from(&self, present: &HashSet<UserId>) -> Vec<UserId> {
        self.sessions
            .keys()
            .filter(|user_id| !present.contains(*user_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Keep voice time that could not be persisted; repeated deferrals accumulate.
    pub fn defer_voice_credit(&mut self, user_id: &UserId, seconds: u64) {
        let pending = self.deferred_credits.entry(user_id.clone()).or_default();
        *pending = pending.saturating_add(seconds);
    }

    pub fn take_deferred_credits(&mut self) -> Vec<(UserId, u64)> {
        self.deferred_credits.drain().collect()
    }

    pub fn deferred_credit(&self, user_id: &UserId) -> Option<u64> {
        self.deferred_credits.get(user_id).copied()
    }
}

//! Activity accrual: turns message and voice-presence events into xp.

pub mod accrual;
pub mod config;
pub mod engine;
pub mod roles;
pub mod scheduler;
pub mod session;

pub use accrual::AccrualRules;
pub use config::LevelingConfig;
pub use engine::{ActivityEngine, LevelUp, ReconcileReport};
pub use roles::{MultiplierSource, RoleMultiplierTable};
pub use scheduler::spawn_reconciliation;
pub use session::{SessionTracker, SharedSessions, VoiceSession, shared_sessions};

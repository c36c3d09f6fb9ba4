pub mod cache;
pub mod database;
pub mod error;
pub mod impls;
pub mod ledger;
pub mod memory;
pub mod model;

pub use cache::CacheService;
pub use database::{Database, MIGRATOR};
pub use error::{LedgerError, LedgerResult};
pub use ledger::LedgerStore;
pub use memory::MemoryLedger;
pub use model::leveling::{LeaderboardEntry, UserId, UserRecord, XpGrant};

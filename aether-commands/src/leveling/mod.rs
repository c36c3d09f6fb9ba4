pub mod leaderboard;
pub mod xp;

pub mod leveling;
pub mod utility;

use aether_core::{Data, Error};

pub struct CommandMeta {
    pub name: &'static str,
    pub desc: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
}

pub const COMMANDS: &[CommandMeta] = &[
    utility::help::META,
    utility::ping::META,
    utility::usage::META,
    leveling::xp::META,
    leveling::leaderboard::META,
];

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        utility::help::help(),
        utility::ping::ping(),
        utility::usage::usage(),
        leveling::xp::xp(),
        leveling::leaderboard::leaderboard(),
    ]
}

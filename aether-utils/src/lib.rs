/// Generic embed builders shared across commands.
pub mod embed;
/// Shared formatting helpers (voice time, progress bars, ranks).
pub mod formatting;
/// Single source of truth for the message-command prefix.
pub const COMMAND_PREFIX: char = '!';

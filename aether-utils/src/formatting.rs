/// Format seconds as `H:MM:SS`, prefixed with whole days when present
/// (e.g. `0:00:45`, `1:02:03`, `2 days, 3:04:05`).
pub fn format_voice_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        _ => format!("{} days, {}", days, clock),
    }
}

/// Render `current / total` as a fixed-width bar.
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    let width = width.max(1);
    let filled = if total == 0 {
        0
    } else {
        let ratio = current.min(total) as f64 / total as f64;
        ((ratio * width as f64).floor() as usize).min(width)
    };

    format!("{}{}", "▰".repeat(filled), "▱".repeat(width - filled))
}

/// Leaderboard prefix: medals for the podium, `#n` after that.
pub fn rank_label(rank: usize) -> String {
    match rank {
        1 => "🥇".to_owned(),
        2 => "🥈".to_owned(),
        3 => "🥉".to_owned(),
        other => format!("#{}", other),
    }
}

/// Name shown for users that can no longer be resolved.
pub fn fallback_user_label(user_id: &str) -> String {
    format!("User {}", user_id)
}

#[cfg(test)]
mod tests {
    use super::{fallback_user_label, format_voice_duration, progress_bar, rank_label};

    #[test]
    fn voice_duration_formatting() {
        assert_eq!(format_voice_duration(0), "0:00:00");
        assert_eq!(format_voice_duration(45), "0:00:45");
        assert_eq!(format_voice_duration(3_723), "1:02:03");
        assert_eq!(format_voice_duration(86_400), "1 day, 0:00:00");
        assert_eq!(format_voice_duration(2 * 86_400 + 11_045), "2 days, 3:04:05");
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0, 100, 4), "▱▱▱▱");
        assert_eq!(progress_bar(50, 100, 4), "▰▰▱▱");
        assert_eq!(progress_bar(99, 100, 4), "▰▰▰▱");
        assert_eq!(progress_bar(300, 100, 4), "▰▰▰▰");
        assert_eq!(progress_bar(5, 0, 2), "▱▱");
    }

    #[test]
    fn rank_labels() {
        assert_eq!(rank_label(1), "🥇");
        assert_eq!(rank_label(3), "🥉");
        assert_eq!(rank_label(4), "#4");
        assert_eq!(fallback_user_label("12"), "User 12");
    }
}

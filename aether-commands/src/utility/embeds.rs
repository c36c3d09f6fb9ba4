use crate::CommandMeta;

pub fn unknown_category_message(wanted_category: &str, valid_categories: &[&str]) -> String {
    let valid = valid_categories
        .iter()
        .map(|category| display_category(category))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Unknown category: {}\nValid categories: {}",
        display_category(wanted_category),
        valid
    )
}

/// Commands grouped under bold category headers, in the order given.
pub fn grouped_help_description(commands: &[&CommandMeta]) -> String {
    let mut out = String::new();
    let mut current_category: Option<&str> = None;

    for command in commands {
        if current_category != Some(command.category) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("**{}**\n", display_category(command.category)));
            current_category = Some(command.category);
        }

        out.push_str(&format!("`{}`: {}\n", command.name, command.desc));
    }

    if out.is_empty() {
        out.push_str("No commands available.");
    }

    out.trim_end().to_owned()
}

fn display_category(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{grouped_help_description, unknown_category_message};
    use crate::CommandMeta;

    const XP: CommandMeta = CommandMeta {
        name: "xp",
        desc: "Show progress.",
        category: "leveling",
        usage: "!xp [user]",
    };
    const HELP: CommandMeta = CommandMeta {
        name: "help",
        desc: "List commands.",
        category: "utility",
        usage: "!help",
    };

    #[test]
    fn groups_commands_by_category() {
        let text = grouped_help_description(&[&XP, &HELP]);
        assert_eq!(
            text,
            "**Leveling**\n`xp`: Show progress.\n\n**Utility**\n`help`: List commands."
        );
    }

    #[test]
    fn empty_help_has_placeholder() {
        assert_eq!(grouped_help_description(&[]), "No commands available.");
    }

    #[test]
    fn unknown_category_lists_valid_ones() {
        assert_eq!(
            unknown_category_message("fun", &["leveling", "utility"]),
            "Unknown category: Fun\nValid categories: Leveling, Utility"
        );
    }
}

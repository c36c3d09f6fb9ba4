use poise::serenity_prelude as serenity;

/// Default embed color used across the bot UI.
pub const DEFAULT_EMBED_COLOR: u32 = 0x6a_4c_93;

/// Base embed with the bot's styling and an optional footer.
pub fn styled_embed(
    title: impl Into<String>,
    description: impl Into<String>,
    footer: Option<&str>,
) -> serenity::CreateEmbed {
    let builder = serenity::CreateEmbed::new()
        .title(title)
        .color(DEFAULT_EMBED_COLOR)
        .description(description);

    match footer {
        Some(text) if !text.is_empty() => builder.footer(serenity::CreateEmbedFooter::new(text)),
        _ => builder,
    }
}

//! Text helpers for Discord-bound output.

use crate::domain::ChannelId;

/// Discord's embed description limit.
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;
/// Discord's limit of embeds per message.
pub const MAX_EMBEDS: usize = 10;

/// Cuts `text` to at most `limit` characters. The flag is true when
/// something was cut.
pub fn truncate_chars(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Single-line preview: newlines flattened, cut to `max_len` characters with
/// a trailing `...`.
pub fn preview_line(text: &str, max_len: usize) -> String {
    let cleaned = text.replace(['\r', '\n'], " ").trim().to_string();
    let (cut, truncated) = truncate_chars(&cleaned, max_len);
    if truncated {
        format!("{cut}...")
    } else {
        cut
    }
}

/// `<#a>`, `<#a> and <#b>`, `<#a>, <#b> and <#c>`.
pub fn join_channels(channels: &[ChannelId]) -> String {
    let mentions: Vec<String> = channels.iter().map(|c| c.mention()).collect();
    match mentions.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Splits long output into embed-sized chunks, at most [`MAX_EMBEDS`] of
/// them. Lines are kept whole unless a single line exceeds the chunk size.
pub fn split_for_embeds(content: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in content.split_inclusive('\n') {
        let mut rest = line;
        while !rest.is_empty() {
            let room = EMBED_DESCRIPTION_LIMIT - current.chars().count();
            let (head, cut) = truncate_chars(rest, room);
            if cut && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                continue;
            }
            current.push_str(&head);
            rest = &rest[head.len()..];
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks.truncate(MAX_EMBEDS);
    chunks
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

//! Shields Discord markup from translation.
//!
//! Mentions, custom emoji, timestamps, URLs and fenced code blocks are swapped
//! for numbered `<:N:>` placeholders before the text reaches a provider and put
//! back afterwards. Placeholders have the shape of a custom emoji, which
//! providers leave alone.

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn protected_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?s)```.*?```",
            r"|<(?:a?:\w*:\d*|@[!&]?\d+|#\d+|t:-?\d+(?::[tTdDfFR])?|/[\w -]+:\d+)>",
            r"|https?://[^\s<>]+",
        ))
        .expect("valid regex")
    })
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<:(\d+):>").expect("valid regex"))
}

/// Text with its markup swapped for placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedText {
    pub text: String,
    spans: Vec<String>,
}

impl ProtectedText {
    pub fn spans(&self) -> &[String] {
        &self.spans
    }

    /// True when nothing but placeholders and whitespace is left.
    pub fn is_untranslatable(&self) -> bool {
        placeholder_re().replace_all(&self.text, "").trim().is_empty()
    }

    /// Puts the original spans back. Placeholders with an unknown index are
    /// left as they are.
    pub fn restore(&self, translated: &str) -> String {
        placeholder_re()
            .replace_all(translated, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.spans.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

pub fn protect(input: &str) -> ProtectedText {
    let mut spans = Vec::new();
    let text = protected_re()
        .replace_all(input, |caps: &Captures<'_>| {
            let idx = spans.len();
            spans.push(caps[0].to_string());
            format!("<:{idx}:>")
        })
        .into_owned();
    ProtectedText { text, spans }
}

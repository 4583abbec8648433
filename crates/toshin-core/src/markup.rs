//! Markup escaping and mention sanitisation

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

pub const ZERO_WIDTH_SPACE: char = '\u{200B}';

const MARKDOWN_SPECIALS: [char; 6] = ['\\', '*', '_', '~', '`', '|'];

/// Escape every markup-significant character so `text` renders literally.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if MARKDOWN_SPECIALS.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn mention_regex() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| Regex::new(r"<(@[!&]?|#)(\d+)>").expect("mention pattern is valid"))
}

fn everyone_regex() -> &'static Regex {
    static EVERYONE: OnceLock<Regex> = OnceLock::new();
    EVERYONE.get_or_init(|| Regex::new(r"@(everyone|here)").expect("everyone pattern is valid"))
}

/// Replace raw mention markup with readable names and defuse mass mentions.
///
/// `names` maps user, role and channel ids to display names. Ids that are not
/// known render as `unknown`.
pub fn sanitize_mentions(text: &str, names: &HashMap<u64, String>) -> String {
    let resolved = mention_regex().replace_all(text, |caps: &Captures| {
        let sigil = if &caps[1] == "#" { '#' } else { '@' };
        let name = caps[2]
            .parse::<u64>()
            .ok()
            .and_then(|id| names.get(&id))
            .map(String::as_str)
            .unwrap_or("unknown");
        format!("{}{}", sigil, name)
    });

    everyone_regex()
        .replace_all(&resolved, |caps: &Captures| {
            format!("@{}{}", ZERO_WIDTH_SPACE, &caps[1])
        })
        .into_owned()
}

pub fn strip_zero_width(text: &str) -> String {
    text.chars().filter(|ch| *ch != ZERO_WIDTH_SPACE).collect()
}

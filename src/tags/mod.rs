//! Weighted tag codec
//!
//! Tags carry an integer emphasis weight in `[-3, 3]`:
//! - `weight > 0` wraps the tag in that many `{` `}` pairs
//! - `weight < 0` wraps the tag in that many `[` `]` pairs
//! - `weight == 0` leaves the tag bare
//!
//! Formatting and parsing are exact inverses for names without bracket characters.

use serde::{Deserialize, Serialize};

/// Lowest allowed weight
pub const MIN_WEIGHT: i32 = -3;

/// Highest allowed weight
pub const MAX_WEIGHT: i32 = 3;

/// A prompt tag with an emphasis weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub weight: i32,
}

impl Tag {
    /// Create a tag, clamping the weight into range
    pub fn new(name: impl Into<String>, weight: i32) -> Self {
        Self {
            name: name.into(),
            weight: clamp_weight(weight),
        }
    }

    /// Shift the weight by `delta`, staying within range
    pub fn adjust(&mut self, delta: i32) {
        self.weight = clamp_weight(self.weight.saturating_add(delta));
    }
}

/// Clamp a weight into `[-3, 3]`
pub fn clamp_weight(weight: i32) -> i32 {
    weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Format a tag as a bracket-annotated string, with an optional prefix
/// (e.g. `artist:`) placed inside the brackets.
pub fn format(tag: &Tag, prefix: Option<&str>) -> String {
    let body = format!("{}{}", prefix.unwrap_or(""), tag.name);
    let weight = clamp_weight(tag.weight);
    let depth = weight.unsigned_abs() as usize;

    let (open, close) = if weight > 0 { ('{', '}') } else { ('[', ']') };

    let mut out = String::with_capacity(body.len() + depth * 2);
    out.extend(std::iter::repeat(open).take(depth));
    out.push_str(&body);
    out.extend(std::iter::repeat(close).take(depth));
    out
}

/// Parse a bracket-annotated string back into a tag.
///
/// The prefix is recognised both outside (`artist:{{wlop}}`) and inside
/// (`{{artist:wlop}}`) the brackets. Unbalanced brackets never fail: the
/// weight becomes 0 and the brackets stay part of the literal name.
pub fn parse(raw: &str, prefix: Option<&str>) -> Tag {
    let trimmed = strip_prefix(raw.trim(), prefix).trim_start();

    let (open, close, sign) = match trimmed.chars().next() {
        Some('{') => ('{', '}', 1),
        Some('[') => ('[', ']', -1),
        _ => {
            return Tag {
                name: trimmed.to_string(),
                weight: 0,
            }
        }
    };

    let opens = trimmed.chars().take_while(|&c| c == open).count();
    let closes = trimmed.chars().rev().take_while(|&c| c == close).count();

    // Same open and close counts only; anything else passes through untouched.
    if opens != closes || opens * 2 > trimmed.len() {
        return Tag {
            name: trimmed.to_string(),
            weight: 0,
        };
    }

    let inner = &trimmed[opens..trimmed.len() - closes];
    Tag {
        name: strip_prefix(inner, prefix).to_string(),
        weight: clamp_weight(sign * opens as i32),
    }
}

/// Parse a comma- or newline-separated list of tags, skipping empty entries
pub fn parse_batch(text: &str, prefix: Option<&str>) -> Vec<Tag> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse(entry, prefix))
        .filter(|tag| !tag.name.is_empty())
        .collect()
}

/// Format a list of tags joined with `", "`
pub fn format_batch(tags: &[Tag], prefix: Option<&str>) -> String {
    tags.iter()
        .map(|tag| format(tag, prefix))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strip a case-insensitive leading prefix
fn strip_prefix<'a>(text: &'a str, prefix: Option<&str>) -> &'a str {
    let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
        return text;
    };

    match text.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &text[prefix.len()..],
        _ => text,
    }
}

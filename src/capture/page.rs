// src/capture/page.rs — Page position marker parsing
//
// Paginated responses carry a footer such as "Page 2 / 67" or "Belongs to x - 2 / 67".
// The first `<current> / <total>` pair in the text wins.

use regex::Regex;
use std::sync::OnceLock;

static POSITION_RE: OnceLock<Regex> = OnceLock::new();

fn position_re() -> &'static Regex {
    POSITION_RE.get_or_init(|| {
        // ASCII digits only; `\d` would also match other Unicode decimal digits
        Regex::new(r"([0-9]+)\s*/\s*([0-9]+)").expect("position marker regex is valid")
    })
}

/// A parsed `current / total` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    pub current: u32,
    pub total: u32,
}

/// Parse the first position marker in `text`.
///
/// Returns `None` when there is no marker, or when the first marker is not a
/// pair of positive integers that fit in a `u32`. Absence is the common case:
/// most messages are not paginated.
pub fn parse_position(text: &str) -> Option<PagePosition> {
    let caps = position_re().captures(text)?;
    let current: u32 = caps.get(1)?.as_str().parse().ok()?;
    let total: u32 = caps.get(2)?.as_str().parse().ok()?;
    if current == 0 || total == 0 {
        return None;
    }
    Some(PagePosition { current, total })
}

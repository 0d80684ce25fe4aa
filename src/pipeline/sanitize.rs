//! Deterministic cleanup of oracle text before it is parsed as JSON.
//!
//! Even when asked for a JSON response, vision models regularly wrap the
//! payload in ```` ```json ```` fences, prefix it with a sentence of prose,
//! or leak a byte-order mark. Each rule below is a pure `&str → String`
//! pass; [`clean_reply`] runs them in order.
//!
//! ## Rule Order
//!
//! Invisible characters go first so that a BOM in front of the fence does
//! not stop fence detection; fences go before payload extraction so that the
//! language tag is never mistaken for prose.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to a raw oracle reply.
///
/// 1. Strip invisible Unicode (BOM, zero-width spaces, word joiners)
/// 2. Strip an outer Markdown code fence, with or without a language tag
/// 3. Cut the outermost JSON array/object out of surrounding prose
pub fn clean_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(&s);
    match extract_json_payload(&s) {
        Some(payload) => payload.to_string(),
        None => s.trim().to_string(),
    }
}

// ── Rule 1: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 3: Extract the JSON payload ─────────────────────────────────────────

/// Slice from the first `[`/`{` to the last matching closer, if both exist.
fn extract_json_payload(input: &str) -> Option<&str> {
    let start = input.find(['[', '{'])?;
    let closer = if input[start..].starts_with('[') { ']' } else { '}' };
    let end = input.rfind(closer)?;
    (end > start).then(|| &input[start..=end])
}

//! "Looks substantive" check for command and code bodies.

use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:echo\s+)?(?:todo|fixme|tbd|xxx)\b.*$|^\.\.\.$|^<[^>]*>$|^(?:true|:|exit\s+0)$")
        .expect("placeholder regex")
});
static PLACEHOLDER_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[A-Za-z]+(?:[-_ /][A-Za-z]+)+>").expect("placeholder token regex")
});

/// Reject empty text, placeholders, and a lone script path with no arguments.
///
/// A bare program name (`pytest`) is accepted; a bare path (`./run.sh`,
/// `/path/to/script`) is not, because it is what drafts emit when they do
/// not know the real invocation.
pub fn is_substantive(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.is_empty() || PLACEHOLDER_RE.is_match(trimmed) {
        return false;
    }
    if PLACEHOLDER_TOKEN_RE.is_match(trimmed) {
        return false;
    }
    let mut tokens = trimmed.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    let lone_token = tokens.next().is_none();
    !(lone_token && first.contains('/'))
}

//! Shell-command inspection and quoting helpers.
//!
//! Commands are treated as opaque POSIX shell text. These helpers only look
//! at surface tokens; they never attempt a full shell parse.

use std::sync::LazyLock;

use regex::Regex;

/// Path fragments of UI-bridge endpoints whose responses describe live UI
/// state. A 2xx from these says nothing about the asserted content.
pub const STATEFUL_ENDPOINT_MARKERS: [&str; 2] = ["/ui-bridge/sdk/", "/ui-bridge/control/elements"];

static CURL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s;&|(])curl\s").expect("curl regex"));
static CONTENT_FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*(?:grep|rg|jq|egrep|fgrep|findstr)\b").expect("content filter regex")
});
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'"`<>)]+"#).expect("url regex"));
static NAVIGATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/page/navigate\b").expect("navigate regex"));
static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:query|text|search|target)"\s*:\s*"([^"]+)""#).expect("query regex")
});

/// Launchers whose first argument is the real tool.
const LAUNCHERS: [&[&str]; 7] = [
    &["npx"],
    &["pnpm", "exec"],
    &["bunx"],
    &["uv", "run"],
    &["poetry", "run"],
    &["python", "-m"],
    &["python3", "-m"],
];

/// Quote `text` as one POSIX shell word.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

pub fn is_curl(command: &str) -> bool {
    CURL_RE.is_match(command)
}

/// True when the command pipes its output through a content matcher.
pub fn has_content_filter(command: &str) -> bool {
    CONTENT_FILTER_RE.is_match(command)
}

pub fn first_url(text: &str) -> Option<&str> {
    URL_RE
        .find(text)
        .map(|found| found.as_str().trim_end_matches(['.', ',', ';', ':']))
}

pub fn references_stateful_endpoint<S: AsRef<str>>(command: &str, markers: &[S]) -> bool {
    markers
        .iter()
        .any(|marker| command.contains(marker.as_ref()))
}

/// True for a curl call that POSTs to a UI-bridge navigate endpoint.
pub fn is_navigation_command(command: &str) -> bool {
    is_curl(command) && NAVIGATE_RE.is_match(command)
}

/// Search text carried in a JSON request payload (`"query": "..."`).
pub fn query_payload(command: &str) -> Option<&str> {
    QUERY_RE
        .captures(command)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str())
}

/// Name of the tool a command invokes, skipping env assignments and
/// launcher prefixes such as `npx` or `uv run`.
pub fn program_name(command: &str) -> Option<String> {
    let first_segment = command
        .split(['|', ';', '&'])
        .map(str::trim)
        .find(|segment| !segment.is_empty() && !segment.starts_with("cd "))?;
    let mut tokens: Vec<&str> = first_segment
        .split_whitespace()
        .skip_while(|token| is_env_assignment(token))
        .collect();
    if tokens.first() == Some(&"sudo") {
        tokens.remove(0);
    }

    loop {
        let Some(launcher) = LAUNCHERS
            .iter()
            .find(|launcher| tokens.len() > launcher.len() && tokens.starts_with(launcher))
        else {
            break;
        };
        tokens.drain(..launcher.len());
        while tokens.first().is_some_and(|token| token.starts_with('-')) {
            tokens.remove(0);
        }
    }

    let program = tokens.first()?;
    let name = program.rsplit('/').next().unwrap_or(program);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn is_env_assignment(token: &str) -> bool {
    token
        .split_once('=')
        .is_some_and(|(key, _)| !key.is_empty() && key.chars().all(|c| c.is_ascii_uppercase() || c == '_'))
}

//! Conversion rules: natural-language checks → deterministic steps.
//!
//! A [`RuleSet`] is an ordered list of `(detect, rewrite)` pairs. The first
//! rule whose detector accepts a clause wins; its rewrite emits one step per
//! distinct assertion the detector found. Rules are ordered from most to
//! least specific. A clause no rule accepts is subjective and stays a prompt.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::{HardenerSettings, Language};
use crate::core::ids::IdAllocator;
use crate::core::shell::{first_url, program_name, quote};
use crate::workflow::{AssertType, CheckType, Phase, Step, StepType, UiAction};

/// What a detector extracted from a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    FileContent { path: String, pattern: String },
    FileExists { path: String, directory: bool },
    Lint { language: Option<Language> },
    Typecheck { language: Option<Language> },
    ApiHealth { url: String },
    PageText { texts: Vec<String> },
    UiState { targets: Vec<String>, assert_type: AssertType },
    UiPresence { needle: String },
}

/// Inputs a rewrite needs beyond the assertion itself.
pub struct RewriteContext<'a> {
    pub settings: &'a HardenerSettings,
    pub ids: &'a mut IdAllocator,
    /// Step the clause came from.
    pub source_id: &'a str,
    pub clause: &'a str,
    pub working_directory: Option<&'a str>,
    /// Project language inferred from the workflow.
    pub language: Language,
}

#[derive(Debug, Clone, Copy)]
pub struct ConversionRule {
    pub name: &'static str,
    pub detect: fn(&str) -> Option<Assertion>,
    pub rewrite: fn(&Assertion, &mut RewriteContext<'_>) -> Vec<Step>,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ConversionRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleSet {
    pub fn standard() -> Self {
        Self {
            rules: vec![
                ConversionRule {
                    name: "file_content",
                    detect: detect_file_content,
                    rewrite: rewrite_file_content,
                },
                ConversionRule {
                    name: "file_exists",
                    detect: detect_file_exists,
                    rewrite: rewrite_file_exists,
                },
                ConversionRule {
                    name: "lint",
                    detect: detect_lint,
                    rewrite: rewrite_quality_check,
                },
                ConversionRule {
                    name: "typecheck",
                    detect: detect_typecheck,
                    rewrite: rewrite_quality_check,
                },
                ConversionRule {
                    name: "api_health",
                    detect: detect_api_health,
                    rewrite: rewrite_api_health,
                },
                ConversionRule {
                    name: "page_text",
                    detect: detect_page_text,
                    rewrite: rewrite_page_text,
                },
                ConversionRule {
                    name: "ui_state",
                    detect: detect_ui_state,
                    rewrite: rewrite_ui_state,
                },
                ConversionRule {
                    name: "ui_presence",
                    detect: detect_ui_presence,
                    rewrite: rewrite_ui_presence,
                },
            ],
        }
    }

    /// Insert a rule ahead of everything at `index` and after.
    pub fn insert(&mut self, index: usize, rule: ConversionRule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    pub fn push(&mut self, rule: ConversionRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ConversionRule] {
        &self.rules
    }

    /// First rule accepting `clause`, with what it extracted.
    pub fn detect(&self, clause: &str) -> Option<(&ConversionRule, Assertion)> {
        self.rules
            .iter()
            .find_map(|rule| (rule.detect)(clause).map(|assertion| (rule, assertion)))
    }
}

const FILE_EXTENSIONS: &str = "rs|py|ts|tsx|js|jsx|mjs|cjs|json|toml|ya?ml|md|txt|css|scss|html|cfg|ini|lock|sh|sql|env|go|java|kt|rb|vue|svelte";

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?:^|[\s'"`(])((?:\.{{1,2}}/|/|~/)?(?:[\w.-]+/)*[\w-]+\.(?:{FILE_EXTENSIONS})|(?:\.{{1,2}}/|/|~/)?(?:[\w.-]+/)+[\w.-]*)(?:$|[\s'"`),:;.!?])"#
    ))
    .expect("path regex")
});
static CONTAINS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:contains?|containing|includes?|including|defines?|exports?|mentions?|has|with)\b")
        .expect("contains regex")
});
static EXISTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:exists?|created|present|generated|written|is added|was added)\b")
        .expect("exists regex")
});
static DIRECTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:directory|folder|dir)\b").expect("directory regex"));
static LINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:lint|lints|linting|linter|eslint|ruff|clippy|flake8|pylint)\b")
        .expect("lint regex")
});
static TYPECHECK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:type[- ]?check(?:s|ed|ing|er)?|type errors?|tsc|mypy|pyright|compiles?|compilation)\b")
        .expect("typecheck regex")
});
static API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:api|endpoint|service|server|backend|health|healthy|responds?|response|reachable|returns?|status|up|available)\b")
        .expect("api regex")
});
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:text|message|messages|says|reads|wording|copy|label|labelled|labeled|title|caption|placeholder|toast|notification|banner)\b")
        .expect("text regex")
});
const ELEMENT_NOUNS: &str = "field|button|input|tab|link|heading|checkbox|toggle|switch|dropdown|select|menu|dialog|modal|section|panel|form|column|card|icon|badge|textbox|textarea|radio|slider|header|sidebar|navbar|tooltip|table|list|option";
static ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{ELEMENT_NOUNS})s?\b")).expect("element regex")
});
static NAMED_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b([A-Z][\w&-]*(?:\s+[A-Z][\w&-]*)*)\s+(?i:{ELEMENT_NOUNS})s?\b"
    ))
    .expect("named target regex")
});
static STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:visible|hidden|enabled|disabled|checked|unchecked|selected|focused|shown|displayed|appears?|present|exists?|shows?|displays?|renders?|rendered)\b")
        .expect("state regex")
});
static UI_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:elements?|components?|ui|widgets?|controls?|layout|structure|interactive)\b")
        .expect("ui word regex")
});
static PRESENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:present|exists?|rendered|registered|appears?|loaded|loads|available|listed|connected|match(?:es)?)\b")
        .expect("presence regex")
});

/// Words that open a sentence but never name a UI element.
const LEADING_VERBS: &[&str] = &[
    "Verify", "Check", "Ensure", "Confirm", "Assert", "Make", "Test", "Validate", "The", "A",
    "An", "That", "Then", "See",
];

fn detect_file_content(clause: &str) -> Option<Assertion> {
    let path = find_path(clause)?;
    if !CONTAINS_RE.is_match(clause) {
        return None;
    }
    let pattern = quoted(clause).into_iter().find(|text| *text != path)?;
    Some(Assertion::FileContent { path, pattern })
}

fn detect_file_exists(clause: &str) -> Option<Assertion> {
    let path = find_path(clause)?;
    if !EXISTS_RE.is_match(clause) {
        return None;
    }
    let directory = path.ends_with('/') || DIRECTORY_RE.is_match(clause);
    Some(Assertion::FileExists { path, directory })
}

fn detect_lint(clause: &str) -> Option<Assertion> {
    LINT_RE.is_match(clause).then(|| Assertion::Lint {
        language: Language::mentioned_in(clause),
    })
}

fn detect_typecheck(clause: &str) -> Option<Assertion> {
    TYPECHECK_RE.is_match(clause).then(|| Assertion::Typecheck {
        language: Language::mentioned_in(clause),
    })
}

fn detect_api_health(clause: &str) -> Option<Assertion> {
    let url = first_url(clause)?;
    API_RE.is_match(clause).then(|| Assertion::ApiHealth {
        url: url.to_string(),
    })
}

fn detect_page_text(clause: &str) -> Option<Assertion> {
    if !TEXT_RE.is_match(clause) {
        return None;
    }
    let texts = distinct(quoted(clause));
    (!texts.is_empty()).then_some(Assertion::PageText { texts })
}

fn detect_ui_state(clause: &str) -> Option<Assertion> {
    let quoted_targets = distinct(quoted(clause));
    let targets = if !quoted_targets.is_empty()
        && (ELEMENT_RE.is_match(clause) || STATE_RE.is_match(clause))
    {
        quoted_targets
    } else {
        distinct(named_targets(clause))
    };
    if targets.is_empty() {
        return None;
    }
    Some(Assertion::UiState {
        targets,
        assert_type: assert_type_for(clause),
    })
}

fn detect_ui_presence(clause: &str) -> Option<Assertion> {
    if !(UI_WORD_RE.is_match(clause) && PRESENCE_RE.is_match(clause)) {
        return None;
    }
    let needle = quoted(clause)
        .into_iter()
        .next()
        .unwrap_or_else(|| "\"id\"".to_string());
    Some(Assertion::UiPresence { needle })
}

fn rewrite_file_content(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let Assertion::FileContent { path, pattern } = assertion else {
        return Vec::new();
    };
    let command = format!("grep -qF -- {} {}", quote(pattern), quote(path));
    let working_directory = ctx.working_directory.map(str::to_string);
    let mut step = check_step(ctx, "file_content", pattern, command, "grep");
    step.working_directory = working_directory;
    vec![step]
}

fn rewrite_file_exists(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let Assertion::FileExists { path, directory } = assertion else {
        return Vec::new();
    };
    let flag = if *directory { "-d" } else { "-f" };
    let command = format!("test {flag} {}", quote(path));
    let working_directory = ctx.working_directory.map(str::to_string);
    let mut step = check_step(ctx, "file_exists", path, command, "test");
    step.working_directory = working_directory;
    vec![step]
}

fn rewrite_quality_check(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let (rule, check_type, language) = match assertion {
        Assertion::Lint { language } => ("lint", CheckType::Lint, language),
        Assertion::Typecheck { language } => ("typecheck", CheckType::Typecheck, language),
        _ => return Vec::new(),
    };
    let language = language.unwrap_or(ctx.language);
    let tools = ctx.settings.tools_for(language);
    let command = match check_type {
        CheckType::Lint => tools.lint.clone(),
        _ => tools.typecheck.clone(),
    };
    let tool = program_name(&command).unwrap_or_else(|| language.as_str().to_string());
    let working_directory = ctx.working_directory.map(str::to_string);
    let mut step = check_step(ctx, rule, language.as_str(), command, &tool);
    step.check_type = Some(check_type);
    step.working_directory = working_directory;
    vec![step]
}

fn rewrite_api_health(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let Assertion::ApiHealth { url } = assertion else {
        return Vec::new();
    };
    let command = format!("curl -sf {}", quote(url));
    vec![check_step(ctx, "api_health", url, command, "curl")]
}

fn rewrite_page_text(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let Assertion::PageText { texts } = assertion else {
        return Vec::new();
    };
    let search_url = format!("{}/ai/search", ctx.settings.sdk_base_url.trim_end_matches('/'));
    texts
        .iter()
        .map(|text| {
            let payload = json!({ "query": text }).to_string();
            let command = format!(
                "curl -s -X POST {} -H 'Content-Type: application/json' -d {} | grep -qF -- {}",
                quote(&search_url),
                quote(&payload),
                quote(text)
            );
            let mut step = check_step(ctx, "page_text", text, command, "curl");
            if texts.len() > 1 {
                step.name = format!("{} ({text})", step.name);
            }
            step
        })
        .collect()
}

fn rewrite_ui_state(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let Assertion::UiState {
        targets,
        assert_type,
    } = assertion
    else {
        return Vec::new();
    };
    targets
        .iter()
        .map(|target| {
            let id = ctx
                .ids
                .mint("ui_state", ctx.source_id, &format!("{}|{target}", ctx.clause));
            let mut name = sentence(ctx.clause);
            if targets.len() > 1 {
                name = format!("{name} ({target})");
            }
            let mut step = Step::new(id, StepType::UiBridge, name).in_phase(Phase::Verification);
            step.action = Some(UiAction::Assert);
            step.target = Some(target.clone());
            step.assert_type = Some(assert_type.clone());
            step.retry_count = Some(ctx.settings.assert_retry_count);
            step.retry_delay_ms = Some(ctx.settings.assert_retry_delay_ms);
            step
        })
        .collect()
}

fn rewrite_ui_presence(assertion: &Assertion, ctx: &mut RewriteContext<'_>) -> Vec<Step> {
    let Assertion::UiPresence { needle } = assertion else {
        return Vec::new();
    };
    let elements_url = format!("{}/elements", ctx.settings.sdk_base_url.trim_end_matches('/'));
    let command = format!("curl -s {} | grep -qF -- {}", quote(&elements_url), quote(needle));
    vec![check_step(ctx, "ui_presence", needle, command, "curl")]
}

/// Verification command step in `custom_command` check mode.
fn check_step(
    ctx: &mut RewriteContext<'_>,
    rule: &str,
    subject: &str,
    command: String,
    tool: &str,
) -> Step {
    let id = ctx
        .ids
        .mint(rule, ctx.source_id, &format!("{}|{subject}", ctx.clause));
    let mut step = Step::new(id, StepType::Command, sentence(ctx.clause)).in_phase(Phase::Verification);
    step.command = Some(command);
    step.check_type = Some(CheckType::CustomCommand);
    step.tool = Some(tool.to_string());
    step
}

/// Clause as a step name: first letter upper-cased, no trailing period.
fn sentence(clause: &str) -> String {
    let trimmed = clause.trim().trim_end_matches('.');
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn find_path(clause: &str) -> Option<String> {
    PATH_RE
        .captures_iter(clause)
        .filter_map(|captures| captures.get(1))
        .map(|found| found.as_str())
        .find(|path| path.contains('/') || path.contains('.'))
        .map(str::to_string)
}

/// Text inside quotes. A `'` only opens a quote at a word start and only
/// closes one at a word end, so apostrophes are left alone.
pub fn quoted(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let close = match chars[index] {
            '"' => Some('"'),
            '`' => Some('`'),
            '“' => Some('”'),
            '\'' if index == 0 || !chars[index - 1].is_alphanumeric() => Some('\''),
            _ => None,
        };
        let end = close.and_then(|close| {
            (index + 1..chars.len()).find(|&pos| {
                chars[pos] == close
                    && (close != '\''
                        || chars.get(pos + 1).is_none_or(|next| !next.is_alphanumeric()))
            })
        });
        match end {
            Some(end) => {
                let inner: String = chars[index + 1..end].iter().collect();
                let inner = inner.trim();
                if !inner.is_empty() && inner.chars().count() <= 80 {
                    out.push(inner.to_string());
                }
                index = end + 1;
            }
            None => index += 1,
        }
    }
    out
}

fn named_targets(clause: &str) -> Vec<String> {
    NAMED_TARGET_RE
        .captures_iter(clause)
        .filter_map(|captures| captures.get(1))
        .filter_map(|found| {
            let words: Vec<&str> = found
                .as_str()
                .split_whitespace()
                .skip_while(|word| LEADING_VERBS.contains(word))
                .collect();
            (!words.is_empty()).then(|| words.join(" "))
        })
        .collect()
}

fn distinct(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn assert_type_for(clause: &str) -> AssertType {
    let lower = clause.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));
    if has(&["unchecked", "not checked"]) {
        AssertType::Unchecked
    } else if has(&["checked", "ticked"]) {
        AssertType::Checked
    } else if has(&["disabled", "greyed out", "grayed out", "not clickable"]) {
        AssertType::Disabled
    } else if has(&["enabled", "clickable"]) {
        AssertType::Enabled
    } else if has(&["focused", "has focus"]) {
        AssertType::Focused
    } else if has(&["hidden", "not visible", "not shown", "not displayed", "disappear"]) {
        AssertType::Hidden
    } else {
        AssertType::Visible
    }
}

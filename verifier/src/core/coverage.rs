//! Agentic-goal coverage approximation.
//!
//! A goal is one clause of an agentic prompt that describes an outcome. It is
//! covered when some gate-eligible verification step mentions at least one
//! of its significant keywords. This is deliberately coarse: it only has to
//! flag goals that nothing in verification even talks about.

use std::collections::BTreeSet;

use crate::workflow::{Phase, Step, Workflow};

const STOPWORDS: &[&str] = &[
    "about", "add", "added", "adds", "after", "against", "all", "also", "and", "any", "are",
    "assert", "available", "be", "been", "before", "being", "but", "button", "can", "card",
    "check", "checks", "confirm", "contain", "contains", "correct", "correctly", "create",
    "current", "display", "displayed", "displays", "does", "each", "element", "elements",
    "ensure", "exist", "exists", "field", "fields", "fix", "for", "from", "has", "have",
    "heading", "implement", "input", "into", "its", "link", "make", "match", "matches", "must",
    "new", "not", "now", "once", "only", "page", "present", "properly", "run", "running",
    "section", "should", "show", "shown", "shows", "step", "steps", "sure", "tab", "test",
    "tests", "than", "that", "the", "their", "them", "then", "there", "these", "this", "those",
    "update", "use", "using", "verify", "visible", "was", "were", "when", "where", "which",
    "while", "will", "with", "within", "work", "working", "works", "you", "your",
];

/// Phrases marking a clause as guidance about the loop itself rather than
/// an outcome to verify.
const META_MARKERS: &[&str] = &[
    "verification phase",
    "verification step",
    "verification failure",
    "check failure",
    "test failure",
    "failures found",
    "failing check",
    "failing test",
];

/// Split free text into candidate clauses: lines, semicolons, and sentence
/// ends. A `.` only ends a sentence when followed by whitespace, so paths and
/// URLs stay intact. Quoted spans are never split.
pub fn clauses(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            current.push(c);
            if c == closing_quote(open) {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '“' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '\'' if current.chars().last().is_none_or(|prev| !prev.is_alphanumeric()) => {
                quote = Some(c);
                current.push(c);
            }
            '\n' | ';' => push_clause(&mut out, &mut current),
            '.' | '!' | '?' if chars.peek().is_none_or(|next| next.is_whitespace()) => {
                push_clause(&mut out, &mut current);
            }
            _ => current.push(c),
        }
    }
    push_clause(&mut out, &mut current);
    out
}

fn closing_quote(open: char) -> char {
    match open {
        '“' => '”',
        other => other,
    }
}

fn push_clause(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c.is_ascii_digit())
        .trim_start_matches(['.', ')'])
        .trim();
    if trimmed.chars().filter(|c| c.is_alphabetic()).count() >= 3 {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Significant lowercase keywords, lightly stemmed.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|word| word.len() >= 3)
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .map(|word| stem(&word))
        .collect()
}

fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

pub fn is_meta_clause(clause: &str) -> bool {
    let lower = clause.to_lowercase();
    lower.starts_with("if ") || META_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Outcome clauses of an agentic prompt.
pub fn goals(step: &Step) -> Vec<String> {
    let text = step
        .content
        .as_deref()
        .filter(|content| !content.trim().is_empty())
        .unwrap_or(&step.name);
    clauses(text)
        .into_iter()
        .filter(|clause| !is_meta_clause(clause) && !keywords(clause).is_empty())
        .collect()
}

pub fn is_covered(goal: &str, workflow: &Workflow) -> bool {
    let wanted = keywords(goal);
    workflow
        .steps(Phase::Verification)
        .iter()
        .filter(|step| step.is_gate_eligible())
        .any(|step| !keywords(&step.searchable_text()).is_disjoint(&wanted))
}

/// `(agentic step id, goal)` for every goal nothing in verification covers.
pub fn uncovered_goals(workflow: &Workflow) -> Vec<(String, String)> {
    workflow
        .steps(Phase::Agentic)
        .iter()
        .filter(|step| step.is_prompt())
        .flat_map(|step| {
            goals(step)
                .into_iter()
                .filter(|goal| !is_covered(goal, workflow))
                .map(|goal| (step.id.clone(), goal))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepType;

    #[test]
    fn clauses_split_sentences_but_not_paths() {
        let parts = clauses(
            "Update src/app.ts to export 'run.now'. Then verify the API at http://localhost:8000/health responds; done",
        );
        assert_eq!(
            parts,
            vec![
                "Update src/app.ts to export 'run.now'",
                "Then verify the API at http://localhost:8000/health responds",
                "done",
            ]
        );
    }

    #[test]
    fn apostrophes_do_not_open_quotes() {
        let parts = clauses("Don't break the build. Verify 'Save' is shown.");
        assert_eq!(parts, vec!["Don't break the build", "Verify 'Save' is shown"]);
    }

    #[test]
    fn loop_guidance_is_not_a_goal() {
        let mut step = Step::new("step-fix", StepType::Prompt, "Fix");
        step.content = Some(
            "Fix any check failures found in the verification phase. If navigation timing is an issue, wait longer."
                .to_string(),
        );
        assert!(goals(&step).is_empty());
    }

    /// Coverage needs only one shared significant keyword.
    #[test]
    fn goal_is_covered_by_keyword_overlap() {
        let mut workflow = Workflow::new("wf");
        let mut assert = Step::new("step-a", StepType::UiBridge, "Verify Runner Name field");
        assert.target = Some("Runner Name".to_string());
        workflow.verification_steps.push(assert);

        assert!(is_covered("Add a Runner Name field to Settings", &workflow));
        assert!(!is_covered("Add dark mode toggle", &workflow));
    }

    #[test]
    fn prompts_in_verification_do_not_cover_goals() {
        let mut workflow = Workflow::new("wf");
        workflow
            .verification_steps
            .push(Step::new("p", StepType::Prompt, "Gallery thumbnails look right"));
        let mut agentic = Step::new("a", StepType::Prompt, "Implement");
        agentic.content = Some("Add thumbnails to the gallery.".to_string());
        workflow.agentic_steps.push(agentic);

        let uncovered = uncovered_goals(&workflow);
        assert_eq!(
            uncovered,
            vec![("a".to_string(), "Add thumbnails to the gallery".to_string())]
        );
    }
}

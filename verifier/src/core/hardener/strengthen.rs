//! Pass 3: content filters for weak stateful checks.
//!
//! A curl to a live UI-state endpoint returns 2xx whether or not the thing
//! being checked is there. Such checks get `| grep -qF '<expected>'`.

use super::rules::quoted;
use super::{HardenAction, HardenReport, HardenerSettings};
use crate::core::shell::{
    has_content_filter, is_curl, is_navigation_command, query_payload, quote,
    references_stateful_endpoint,
};
use crate::workflow::{Step, StepType, Workflow};

/// Expected text when nothing more specific is known: any element or
/// search hit carries an `"id"` key.
const ANY_RESULT: &str = "\"id\"";

pub fn is_weak_stateful_check<S: AsRef<str>>(step: &Step, markers: &[S]) -> bool {
    if step.step_type != StepType::Command {
        return false;
    }
    let Some(command) = step.command.as_deref() else {
        return false;
    };
    is_curl(command)
        && references_stateful_endpoint(command, markers)
        && !has_content_filter(command)
        && !is_navigation_command(command)
}

pub fn strengthen(workflow: &mut Workflow, settings: &HardenerSettings, report: &mut HardenReport) {
    for step in &mut workflow.verification_steps {
        if !is_weak_stateful_check(step, &settings.stateful_endpoint_markers) {
            continue;
        }
        let Some(command) = step.command.as_deref() else {
            continue;
        };
        let expected = query_payload(command)
            .map(str::to_string)
            .or_else(|| quoted(&step.name).into_iter().next())
            .unwrap_or_else(|| ANY_RESULT.to_string());
        let strengthened = format!("{} | grep -qF -- {}", command.trim_end(), quote(&expected));
        step.command = Some(strengthened);
        report.push(HardenAction::Strengthened {
            step_id: step.id.clone(),
            expected,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{CheckType, Phase};

    fn curl_step(id: &str, name: &str, command: &str) -> Step {
        let mut step = Step::new(id, StepType::Command, name).in_phase(Phase::Verification);
        step.check_type = Some(CheckType::CustomCommand);
        step.tool = Some("curl".to_string());
        step.command = Some(command.to_string());
        step
    }

    fn strengthened(step: Step) -> (Step, HardenReport) {
        let mut workflow = Workflow::new("wf");
        workflow.verification_steps.push(step);
        let mut report = HardenReport::default();
        strengthen(&mut workflow, &HardenerSettings::default(), &mut report);
        (workflow.verification_steps.remove(0), report)
    }

    #[test]
    fn search_payload_supplies_expected_text() {
        let (step, report) = strengthened(curl_step(
            "search",
            "Search for runner name",
            r#"curl -s -X POST http://localhost:9876/ui-bridge/sdk/ai/search -d '{"query":"Runner Name"}'"#,
        ));
        assert!(
            step.command
                .as_deref()
                .expect("command")
                .ends_with("| grep -qF -- 'Runner Name'")
        );
        assert_eq!(report.actions.len(), 1);
    }

    #[test]
    fn quoted_name_then_any_element() {
        let (step, _) = strengthened(curl_step(
            "named",
            "Elements include 'Save'",
            "curl -s http://localhost:9876/ui-bridge/control/elements",
        ));
        assert!(step.command.expect("command").ends_with("grep -qF -- 'Save'"));

        let (step, _) = strengthened(curl_step(
            "any",
            "Elements load",
            "curl -s http://localhost:9876/ui-bridge/control/elements",
        ));
        assert!(
            step.command
                .expect("command")
                .ends_with(r#"grep -qF -- '"id"'"#)
        );
    }

    #[test]
    fn filtered_and_unrelated_commands_are_left_alone() {
        for command in [
            "curl -s http://localhost:9876/ui-bridge/control/elements | jq -e '.[0]'",
            "curl -sf http://localhost:8000/health",
            r#"curl -s -X POST http://localhost:9876/ui-bridge/sdk/page/navigate -d '{"url":"/"}'"#,
        ] {
            let (_, report) = strengthened(curl_step("c", "c", command));
            assert!(report.is_empty(), "changed {command}");
        }
    }
}

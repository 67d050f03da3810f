//! Built-in verification flows for the interview setup screen

use serde_json::json;

use crate::error::E2eResult;
use crate::locator::ElementTarget;
use crate::mock::MockRule;
use crate::spec::{Observable, Predicate, Scenario, Step, SuggestionListBinding};

pub const TARGET_ROLE_LABEL: &str = "Target Role";
pub const TARGET_ROLE_INPUT: &str = "input#target-role";
pub const SUGGESTIONS_PATTERN: &str = "**/api/suggestions";

/// Suggestions the mocked endpoint answers with, in display order
pub const MOCK_SUGGESTIONS: [&str; 3] =
    ["Software Engineer", "Software Developer", "Solution Architect"];

fn navigate_home() -> Step {
    Step::Navigate { url: "/".into() }
}

fn screenshot(label: &str) -> Step {
    Step::Screenshot { label: label.into() }
}

fn wait_for(predicate: Predicate, timeout_ms: Option<u64>) -> Step {
    Step::WaitFor { predicate, timeout_ms }
}

/// Fill the setup form and land on the interview screen
pub fn setup_to_interview() -> Scenario {
    Scenario::new(
        "setup-to-interview",
        vec![
            navigate_home(),
            wait_for(Predicate::text_present(TARGET_ROLE_LABEL), None),
            screenshot("setup"),
            Step::Fill {
                target: ElementTarget::css(TARGET_ROLE_INPUT),
                value: "Software Engineer".into(),
            },
            Step::Click { target: ElementTarget::role_named("button", "Begin Interview") },
            wait_for(
                Predicate::visible(ElementTarget::role_named("button", "Start Interview")),
                None,
            ),
            screenshot("interview_start"),
        ],
    )
    .with_description("Setup form submits and the interview screen appears")
    .with_tags(&["smoke", "setup"])
}

/// Pick a suggestion with the keyboard against a mocked endpoint
pub fn keyboard_navigation() -> E2eResult<Scenario> {
    let input = ElementTarget::label(TARGET_ROLE_LABEL);
    let mock = MockRule::json(SUGGESTIONS_PATTERN, &json!({ "suggestions": MOCK_SUGGESTIONS }))?;

    let scenario = Scenario::new(
        "keyboard-navigation",
        vec![
            navigate_home(),
            wait_for(Predicate::visible(input.clone()), None),
            Step::Focus { target: input.clone() },
            Step::TypeSlowly {
                target: input.clone(),
                text: "Sof".into(),
                per_key_delay_ms: 100,
            },
            wait_for(Predicate::visible(ElementTarget::role("listbox")), Some(10_000)),
            Step::PressKey { target: input.clone(), key: "ArrowDown".into() },
            Step::AssertEquals {
                observe: Observable::Text { target: ElementTarget::role_selected("option") },
                expected: MOCK_SUGGESTIONS[0].into(),
            },
            screenshot("keyboard_nav_highlight"),
            Step::PressKey { target: input.clone(), key: "Enter".into() },
            Step::AssertEquals {
                observe: Observable::Value { target: input.clone() },
                expected: MOCK_SUGGESTIONS[0].into(),
            },
        ],
    )
    .with_description("ArrowDown highlights the first suggestion and Enter commits it")
    .with_tags(&["suggestions", "keyboard"])
    .with_mock(mock)
    .with_suggestion_list(SuggestionListBinding::new(input));

    Ok(scenario)
}

/// Continue past the interview screen until the connection starts
pub fn interview_connecting() -> Scenario {
    let mut steps = setup_to_interview().steps;
    steps.extend([
        Step::Click { target: ElementTarget::role_named("button", "Start Interview") },
        wait_for(Predicate::text_present("Connecting to interviewer..."), None),
        screenshot("connecting"),
    ]);

    Scenario::new("interview-connecting", steps)
        .with_description("Starting the interview shows the connecting state")
        .with_tags(&["setup", "interview"])
}

/// Every built-in scenario, in run order
pub fn builtin() -> E2eResult<Vec<Scenario>> {
    Ok(vec![setup_to_interview(), keyboard_navigation()?, interview_connecting()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenarios_validate() {
        let scenarios = builtin().unwrap();
        assert_eq!(scenarios.len(), 3);
        for scenario in &scenarios {
            scenario.validate().unwrap();
        }
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let scenarios = builtin().unwrap();
        let mut names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn test_setup_checkpoints() {
        let labels: Vec<_> = setup_to_interview()
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Screenshot { label } => Some(label.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, ["setup", "interview_start"]);
    }

    #[test]
    fn test_keyboard_navigation_mocks_suggestions() {
        let scenario = keyboard_navigation().unwrap();
        assert_eq!(scenario.mocks.len(), 1);
        assert_eq!(scenario.mocks[0].pattern, SUGGESTIONS_PATTERN);

        let body: serde_json::Value =
            serde_json::from_str(&scenario.mocks[0].render_body().unwrap()).unwrap();
        assert_eq!(body["suggestions"][0], "Software Engineer");
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);

        let binding = scenario.suggestion_list.unwrap();
        assert_eq!(binding.input, ElementTarget::label(TARGET_ROLE_LABEL));
        assert_eq!(binding.min_query_len, 3);
    }

    #[test]
    fn test_connecting_extends_setup() {
        let setup = setup_to_interview();
        let connecting = interview_connecting();
        assert_eq!(connecting.steps[..setup.steps.len()], setup.steps[..]);
        assert_eq!(connecting.steps.last(), Some(&Step::Screenshot { label: "connecting".into() }));
    }
}

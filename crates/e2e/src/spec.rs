//! Declarative scenario definitions
//!
//! Scenarios are plain data: built in Rust (see [`crate::scenarios`]) or
//! parsed from YAML. Execution is the orchestrator's job.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostics::ERROR_LABEL;
use crate::error::{E2eError, E2eResult};
use crate::locator::ElementTarget;
use crate::mock::MockRule;

/// A named, ordered sequence of steps representing one verification flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name, also used for the diagnostics subdirectory
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Mock rules installed before the first step
    #[serde(default)]
    pub mocks: Vec<MockRule>,

    /// Suggestion list whose keyboard behaviour is checked against the model
    #[serde(default)]
    pub suggestion_list: Option<SuggestionListBinding>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// Where the autocomplete widget lives on the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionListBinding {
    /// Input the user types into
    pub input: ElementTarget,

    /// The popup list container
    #[serde(default = "default_listbox")]
    pub listbox: ElementTarget,

    /// Role of the individual suggestions
    #[serde(default = "default_option_role")]
    pub option_role: String,

    /// Shortest query the application fetches suggestions for
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
}

fn default_listbox() -> ElementTarget {
    ElementTarget::role("listbox")
}

fn default_option_role() -> String {
    "option".to_string()
}

fn default_min_query_len() -> usize {
    3
}

impl SuggestionListBinding {
    pub fn new(input: ElementTarget) -> Self {
        Self {
            input,
            listbox: default_listbox(),
            option_role: default_option_role(),
            min_query_len: default_min_query_len(),
        }
    }

    /// Locator matching every option in the list
    pub fn options(&self) -> ElementTarget {
        ElementTarget::role(self.option_role.clone())
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative URLs are joined to the base URL)
    Navigate { url: String },

    /// Replace an input's value in one atomic action
    Fill { target: ElementTarget, value: String },

    /// Click an element
    Click { target: ElementTarget },

    /// Move keyboard focus to an element
    Focus { target: ElementTarget },

    /// Type one keystroke per character with a delay between them
    TypeSlowly {
        target: ElementTarget,
        text: String,
        #[serde(default = "default_per_key_delay")]
        per_key_delay_ms: u64,
    },

    /// Dispatch a single named key event
    PressKey { target: ElementTarget, key: String },

    /// Wait for a DOM condition
    WaitFor {
        predicate: Predicate,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Read an observable once and compare it
    AssertEquals { observe: Observable, expected: String },

    /// Capture a labelled checkpoint screenshot
    Screenshot { label: String },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_per_key_delay() -> u64 {
    100
}

impl Step {
    /// Short name used in logs, reports and failure messages
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::Fill { target, .. } => format!("fill:{}", target),
            Step::Click { target } => format!("click:{}", target),
            Step::Focus { target } => format!("focus:{}", target),
            Step::TypeSlowly { target, text, .. } => format!("type:{}:{}", target, text),
            Step::PressKey { key, .. } => format!("press:{}", key),
            Step::WaitFor { predicate, .. } => format!("wait:{}", predicate),
            Step::AssertEquals { observe, .. } => format!("assert:{}", observe),
            Step::Screenshot { label } => format!("screenshot:{}", label),
            Step::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

/// A side-effect-free condition evaluated against the live DOM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Visible { target: ElementTarget },
    Hidden { target: ElementTarget },
    Attached { target: ElementTarget },
    TextPresent { text: String },
    AttributeEquals {
        target: ElementTarget,
        name: String,
        value: String,
    },
    ValueEquals { target: ElementTarget, value: String },
}

impl Predicate {
    pub fn visible(target: ElementTarget) -> Self {
        Predicate::Visible { target }
    }

    pub fn text_present(text: impl Into<String>) -> Self {
        Predicate::TextPresent { text: text.into() }
    }

    /// The element this predicate looks at, if any
    pub fn target(&self) -> Option<&ElementTarget> {
        match self {
            Predicate::Visible { target }
            | Predicate::Hidden { target }
            | Predicate::Attached { target }
            | Predicate::AttributeEquals { target, .. }
            | Predicate::ValueEquals { target, .. } => Some(target),
            Predicate::TextPresent { .. } => None,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Visible { target } => write!(f, "{} visible", target),
            Predicate::Hidden { target } => write!(f, "{} hidden", target),
            Predicate::Attached { target } => write!(f, "{} attached", target),
            Predicate::TextPresent { text } => write!(f, "text \"{}\" present", text),
            Predicate::AttributeEquals { target, name, value } => {
                write!(f, "{}[{}=\"{}\"]", target, name, value)
            }
            Predicate::ValueEquals { target, value } => {
                write!(f, "{} value == \"{}\"", target, value)
            }
        }
    }
}

/// Something an `AssertEquals` step reads from an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "of", rename_all = "snake_case")]
pub enum Observable {
    Text { target: ElementTarget },
    Value { target: ElementTarget },
    Attribute { target: ElementTarget, name: String },
}

impl Observable {
    pub fn target(&self) -> &ElementTarget {
        match self {
            Observable::Text { target }
            | Observable::Value { target }
            | Observable::Attribute { target, .. } => target,
        }
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observable::Text { target } => write!(f, "text of {}", target),
            Observable::Value { target } => write!(f, "value of {}", target),
            Observable::Attribute { target, name } => write!(f, "{} of {}", name, target),
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            mocks: Vec::new(),
            suggestion_list: None,
            steps,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_mock(mut self, rule: MockRule) -> Self {
        self.mocks.push(rule);
        self
    }

    pub fn with_suggestion_list(mut self, binding: SuggestionListBinding) -> Self {
        self.suggestion_list = Some(binding);
        self
    }

    /// Check everything that must be right before the first step runs
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(E2eError::SpecParse(format!(
                "scenario name '{}' must not contain path separators",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("scenario '{}' has no steps", self.name)));
        }
        for rule in &self.mocks {
            rule.validate()?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let Step::Screenshot { label } = step {
                if label.trim().is_empty() || label.contains(['/', '\\']) {
                    return Err(E2eError::SpecParse(format!(
                        "step {} has an invalid screenshot label '{}'",
                        i, label
                    )));
                }
                if label == ERROR_LABEL {
                    return Err(E2eError::SpecParse(format!(
                        "step {}: label '{}' is reserved for failure captures",
                        i, label
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}

//! Element locators
//!
//! A locator must resolve to exactly one element at evaluation time. The
//! locator itself is a pure description; resolution happens in the page.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A rule identifying exactly one DOM element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ElementTarget {
    /// CSS selector, e.g. `input#target-role`
    Css { selector: String },

    /// ARIA role plus optional accessible name and selected state
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected: Option<bool>,
    },

    /// Form control by its accessible label
    Label { text: String },

    /// Element whose visible text is exactly `text`
    Text { text: String },
}

impl ElementTarget {
    pub fn css(selector: impl Into<String>) -> Self {
        ElementTarget::Css { selector: selector.into() }
    }

    pub fn role(role: impl Into<String>) -> Self {
        ElementTarget::Role { role: role.into(), name: None, selected: None }
    }

    /// Role with an accessible name, e.g. a button by its caption
    pub fn role_named(role: impl Into<String>, name: impl Into<String>) -> Self {
        ElementTarget::Role {
            role: role.into(),
            name: Some(name.into()),
            selected: None,
        }
    }

    /// The single element of `role` currently in the selected state
    pub fn role_selected(role: impl Into<String>) -> Self {
        ElementTarget::Role {
            role: role.into(),
            name: None,
            selected: Some(true),
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        ElementTarget::Label { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ElementTarget::Text { text: text.into() }
    }

    /// Playwright selector-engine form, used in logs and step names
    pub fn selector(&self) -> String {
        match self {
            ElementTarget::Css { selector } => selector.clone(),
            ElementTarget::Role { role, name, selected } => {
                let mut s = format!("role={}", role);
                if let Some(name) = name {
                    s.push_str(&format!("[name=\"{}\"]", name));
                }
                if let Some(selected) = selected {
                    s.push_str(&format!("[selected={}]", selected));
                }
                s
            }
            ElementTarget::Label { text } => format!("label={}", text),
            ElementTarget::Text { text } => format!("text={}", text),
        }
    }

    /// Accessible name when this is a role locator with a name filter
    pub fn role_name(&self, expected_role: &str) -> Option<&str> {
        match self {
            ElementTarget::Role { role, name: Some(name), .. } if role == expected_role => {
                Some(name.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector())
    }
}

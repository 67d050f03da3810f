//! Network mocking for deterministic flows
//!
//! Rules are session scoped: the orchestrator owns one [`NetworkMock`] per
//! scenario run and installs every rule on that run's page before the first
//! step. Once installed a rule intercepts every matching request until the
//! page closes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{E2eError, E2eResult};

/// A request-pattern-to-canned-response mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockRule {
    /// URL glob anchored against the full request URL (`**` spans segments)
    pub pattern: String,

    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    pub body: MockBody,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Response body: a raw string, or a JSON document serialized at install time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MockBody {
    Text(String),
    Json(serde_json::Value),
}

impl MockRule {
    /// JSON response with status 200
    pub fn json<T: Serialize>(pattern: impl Into<String>, body: &T) -> E2eResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| E2eError::MockSetup(format!("body does not serialize: {}", e)))?;
        Ok(Self {
            pattern: pattern.into(),
            status: default_status(),
            content_type: default_content_type(),
            body: MockBody::Json(value),
        })
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Reject malformed rules before a scenario starts
    pub fn validate(&self) -> E2eResult<()> {
        if self.pattern.trim().is_empty() {
            return Err(E2eError::MockSetup("pattern must not be empty".into()));
        }
        if !(100..=599).contains(&self.status) {
            return Err(E2eError::MockSetup(format!(
                "status {} for '{}' is not a valid HTTP status",
                self.status, self.pattern
            )));
        }
        if self.content_type.trim().is_empty() {
            return Err(E2eError::MockSetup(format!(
                "content type for '{}' must not be empty",
                self.pattern
            )));
        }
        self.render_body()?;
        Ok(())
    }

    /// The body as sent on the wire
    pub fn render_body(&self) -> E2eResult<String> {
        match &self.body {
            MockBody::Json(value) => serde_json::to_string(value)
                .map_err(|e| E2eError::MockSetup(format!("body for '{}': {}", self.pattern, e))),
            MockBody::Text(text) => {
                if self.content_type.contains("json") {
                    serde_json::from_str::<serde_json::Value>(text).map_err(|e| {
                        E2eError::MockSetup(format!(
                            "body for '{}' is declared JSON but does not parse: {}",
                            self.pattern, e
                        ))
                    })?;
                }
                Ok(text.clone())
            }
        }
    }
}

/// A canned response handed back for an intercepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// A validated rule with its compiled matcher
#[derive(Debug, Clone)]
pub struct InstalledRule {
    pub id: usize,
    pub rule: MockRule,
    pub body: String,
    matcher: Regex,
    hits: usize,
}

impl InstalledRule {
    pub fn matches(&self, url: &str) -> bool {
        self.matcher.is_match(url)
    }

    pub fn response(&self) -> MockResponse {
        MockResponse {
            status: self.rule.status,
            content_type: self.rule.content_type.clone(),
            body: self.body.clone(),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Session-scoped registry of installed mock rules
#[derive(Debug, Default)]
pub struct NetworkMock {
    rules: Vec<InstalledRule>,
}

impl NetworkMock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a rule; later rules take precedence on overlap
    pub fn install(&mut self, rule: MockRule) -> E2eResult<&InstalledRule> {
        rule.validate()?;
        let matcher = compile_glob(&rule.pattern)?;
        let body = rule.render_body()?;
        let id = self.rules.len();

        info!("Installing mock for {} (status {})", rule.pattern, rule.status);
        self.rules.push(InstalledRule { id, rule, body, matcher, hits: 0 });

        // Just pushed, so the registry cannot be empty here.
        self.rules
            .last()
            .ok_or_else(|| E2eError::MockSetup("rule registry is empty".into()))
    }

    /// Whether `url` matches glob `pattern`
    pub fn url_matches(url: &str, pattern: &str) -> E2eResult<bool> {
        Ok(compile_glob(pattern)?.is_match(url))
    }

    /// The most recently installed rule matching `url`
    pub fn matching_rule(&self, url: &str) -> Option<&InstalledRule> {
        self.rules.iter().rev().find(|r| r.matches(url))
    }

    /// Serve `url` from the registry, or `None` to let it pass through
    pub fn intercept(&mut self, url: &str) -> Option<MockResponse> {
        let rule = self.rules.iter_mut().rev().find(|r| r.matches(url))?;
        rule.hits += 1;
        info!("Intercepted request to {}", url);
        Some(rule.response())
    }

    pub fn rules(&self) -> &[InstalledRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Translate a URL glob into an anchored regex.
///
/// `**` matches any character sequence, `*` any sequence without `/`, and
/// `?` one character other than `/`.
fn compile_glob(pattern: &str) -> E2eResult<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| E2eError::MockSetup(format!("bad pattern '{}': {}", pattern, e)))
}

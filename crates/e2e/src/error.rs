//! Error types for E2E flows

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// A locator matched zero or several elements when exactly one was required
    #[error("Target {target} resolved to {matched} elements (expected exactly one)")]
    Resolution { target: String, matched: usize },

    #[error("Timed out after {elapsed_ms} ms waiting for: {description}")]
    Timeout { description: String, elapsed_ms: u64 },

    #[error("Assertion failed for {subject}: expected {expected:?}, got {actual:?}")]
    AssertionMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("Mock setup error: {0}")]
    MockSetup(String),

    #[error("Diagnostics capture failed: {0}")]
    Capture(String),

    /// The element is not in the DOM yet; waiters treat this as "not satisfied"
    #[error("Element not attached: {0}")]
    NotAttached(String),

    #[error("Scenario '{scenario}' failed at step {index} ({step}): {cause}")]
    StepFailed {
        scenario: String,
        index: usize,
        step: String,
        #[source]
        cause: Box<E2eError>,
        artifact: Option<PathBuf>,
    },

    #[error("Invalid suggestion list transition: {0}")]
    InvalidTransition(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Playwright bridge exited")]
    BridgeClosed,

    #[error("Application failed to start: {0}")]
    AppStartup(String),

    #[error("Application health check failed after {0} attempts")]
    AppHealthCheck(usize),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether a waiter should keep polling after seeing this error
    pub fn is_transient(&self) -> bool {
        matches!(self, E2eError::NotAttached(_))
    }

    /// The innermost cause, looking through `StepFailed` wrappers
    pub fn root_cause(&self) -> &E2eError {
        match self {
            E2eError::StepFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

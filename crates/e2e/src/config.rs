//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::AppConfig;
use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::wait::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Where the application under test is served
    pub base_url: String,

    /// Screenshots land in `<diagnostics_dir>/<scenario>/<run-id>/<label>.png`
    pub diagnostics_dir: PathBuf,

    /// YAML scenarios; the built-in flows run when unset
    pub scenarios_dir: Option<PathBuf>,

    /// Where `test-results.json` is written
    pub output_dir: PathBuf,

    pub timeouts: TimeoutConfig,

    pub playwright: PlaywrightConfig,

    pub app: AppConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            diagnostics_dir: PathBuf::from("verification"),
            scenarios_dir: None,
            output_dir: PathBuf::from("test-results"),
            timeouts: TimeoutConfig::default(),
            playwright: PlaywrightConfig::default(),
            app: AppConfig::default(),
        }
    }
}

/// Bounds for waits and actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default for `WaitFor` steps without an explicit timeout
    pub wait_ms: u64,

    /// Implicit wait for an action's target to be attached
    pub action_ms: u64,

    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            wait_ms: DEFAULT_WAIT_TIMEOUT_MS,
            action_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TimeoutConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when missing
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(E2eError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.timeouts.wait_ms == 0 || self.timeouts.action_ms == 0 {
            return Err(E2eError::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }
}

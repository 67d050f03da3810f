//! Application under test - optional launch and readiness checks

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// How to reach (and optionally start) the application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Command that serves the app, e.g. `["npm", "run", "dev"]`
    pub command: Option<Vec<String>>,

    /// Path polled until the app answers
    pub health_path: String,

    pub startup_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            command: None,
            health_path: "/".to_string(),
            startup_timeout_secs: 60,
        }
    }
}

/// The running application; stops a spawned process on drop
pub struct AppHandle {
    child: Option<Child>,
    base_url: String,
}

impl AppHandle {
    /// Spawn the app if a command is configured, then wait until it answers
    pub async fn start(config: &AppConfig, base_url: &str) -> E2eResult<Self> {
        let child = match &config.command {
            Some(command) => Some(spawn(command)?),
            None => None,
        };

        let handle = AppHandle {
            child,
            base_url: base_url.trim_end_matches('/').to_string(),
        };

        handle
            .wait_for_healthy(
                &config.health_path,
                Duration::from_secs(config.startup_timeout_secs),
            )
            .await?;

        info!("Application is reachable at {}", handle.base_url);
        Ok(handle)
    }

    /// Poll the health URL until it responds successfully
    async fn wait_for_healthy(&self, path: &str, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for application at {}...", health_url);
                    }
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::AppHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop a spawned application; no-op when it was already running
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        info!("Stopping application (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for AppHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn(command: &[String]) -> E2eResult<Child> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| E2eError::AppStartup("empty application command".into()))?;

    info!("Starting application: {}", command.join(" "));
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| E2eError::AppStartup(format!("failed to spawn {}: {}", program, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(spawn(&[]), Err(E2eError::AppStartup(_))));
    }

    #[tokio::test]
    async fn test_unreachable_app_fails_health_check() {
        let config = AppConfig {
            command: None,
            health_path: "/".into(),
            startup_timeout_secs: 1,
        };
        // Port 9 (discard) is not expected to serve HTTP.
        let result = AppHandle::start(&config, "http://127.0.0.1:9").await;
        assert!(matches!(result, Err(E2eError::AppHealthCheck(n)) if n >= 1));
    }
}

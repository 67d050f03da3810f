//! Bounded waiting for eventually-consistent DOM state
//!
//! The first evaluation happens immediately, then the condition is polled at
//! a fixed interval until it holds or the timeout elapses. A final check is
//! made at the deadline so a condition that becomes true at the last moment
//! is not reported as a timeout.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};
use crate::locator::ElementTarget;
use crate::page::Page;
use crate::spec::Predicate;

/// Default timeout for waits and implicit action-waits
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Polling never runs faster than this
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    Satisfied { elapsed_ms: u64 },
    TimedOut { description: String, elapsed_ms: u64 },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }

    /// Turn a timeout into [`E2eError::Timeout`]
    pub fn into_result(self) -> E2eResult<u64> {
        match self {
            WaitOutcome::Satisfied { elapsed_ms } => Ok(elapsed_ms),
            WaitOutcome::TimedOut { description, elapsed_ms } => {
                Err(E2eError::Timeout { description, elapsed_ms })
            }
        }
    }
}

/// Polls conditions until they hold or a bound elapses
#[derive(Debug, Clone)]
pub struct ConditionWaiter {
    default_timeout: Duration,
    poll_interval: Duration,
}

impl Default for ConditionWaiter {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }
}

impl ConditionWaiter {
    pub fn new(default_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            default_timeout,
            poll_interval: poll_interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS)),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for a DOM predicate
    pub async fn wait_for(
        &self,
        page: &dyn Page,
        predicate: &Predicate,
        timeout: Option<Duration>,
    ) -> E2eResult<WaitOutcome> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        self.poll(&predicate.to_string(), timeout, || evaluate(page, predicate))
            .await
    }

    /// Wait until `target` resolves to at least one element
    pub async fn wait_attached(
        &self,
        page: &dyn Page,
        target: &ElementTarget,
        timeout: Option<Duration>,
    ) -> E2eResult<WaitOutcome> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let description = format!("{} to be attached", target);
        self.poll(&description, timeout, || async move {
            Ok::<_, E2eError>(page.count(target).await? > 0)
        })
        .await
    }

    /// Poll an arbitrary side-effect-free check.
    ///
    /// Transient errors count as "not yet"; any other error ends the wait.
    pub async fn poll<F, Fut>(
        &self,
        description: &str,
        timeout: Duration,
        mut check: F,
    ) -> E2eResult<WaitOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = E2eResult<bool>>,
    {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let holds = match check().await {
                Ok(holds) => holds,
                Err(e) if e.is_transient() => {
                    trace!("{}: transient ({})", description, e);
                    false
                }
                Err(e) => return Err(e),
            };

            let elapsed_ms = start.elapsed().as_millis() as u64;
            if holds {
                debug!("{} satisfied after {} ms ({} checks)", description, elapsed_ms, attempts);
                return Ok(WaitOutcome::Satisfied { elapsed_ms });
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("{} timed out after {} ms ({} checks)", description, elapsed_ms, attempts);
                return Ok(WaitOutcome::TimedOut {
                    description: description.to_string(),
                    elapsed_ms,
                });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Evaluate a predicate once against the live DOM
async fn evaluate(page: &dyn Page, predicate: &Predicate) -> E2eResult<bool> {
    match predicate {
        Predicate::TextPresent { text } => page.has_text(text).await,
        Predicate::Hidden { target } => match strict_count(page, target).await? {
            0 => Ok(true),
            _ => Ok(!page.is_visible(target).await?),
        },
        Predicate::Visible { target } => match strict_count(page, target).await? {
            0 => Ok(false),
            _ => page.is_visible(target).await,
        },
        Predicate::Attached { target } => Ok(strict_count(page, target).await? == 1),
        Predicate::AttributeEquals { target, name, value } => {
            match strict_count(page, target).await? {
                0 => Ok(false),
                _ => Ok(page.attribute(target, name).await?.as_deref() == Some(value.as_str())),
            }
        }
        Predicate::ValueEquals { target, value } => match strict_count(page, target).await? {
            0 => Ok(false),
            _ => Ok(page.input_value(target).await? == *value),
        },
    }
}

/// Element count, failing hard when the target is ambiguous
async fn strict_count(page: &dyn Page, target: &ElementTarget) -> E2eResult<usize> {
    let matched = page.count(target).await?;
    if matched > 1 {
        return Err(E2eError::Resolution {
            target: target.to_string(),
            matched,
        });
    }
    Ok(matched)
}

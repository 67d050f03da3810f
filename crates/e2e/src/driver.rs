//! User-like interactions
//!
//! Every action first waits (bounded) for its target to be attached, then
//! insists on exactly one match before acting.

use std::time::Duration;

use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::locator::ElementTarget;
use crate::page::Page;
use crate::wait::ConditionWaiter;

pub struct InteractionDriver<'a> {
    page: &'a dyn Page,
    waiter: &'a ConditionWaiter,
    action_timeout: Duration,
    base_url: &'a str,
}

impl<'a> InteractionDriver<'a> {
    pub fn new(
        page: &'a dyn Page,
        waiter: &'a ConditionWaiter,
        action_timeout: Duration,
        base_url: &'a str,
    ) -> Self {
        Self { page, waiter, action_timeout, base_url }
    }

    pub fn page(&self) -> &'a dyn Page {
        self.page
    }

    pub async fn navigate(&self, url: &str) -> E2eResult<()> {
        let url = resolve_url(self.base_url, url);
        debug!("Navigating to {}", url);
        self.page.goto(&url).await
    }

    /// Replace the whole value in one atomic action
    pub async fn fill(&self, target: &ElementTarget, value: &str) -> E2eResult<()> {
        self.resolve(target).await?;
        self.page.fill(target, value).await
    }

    pub async fn click(&self, target: &ElementTarget) -> E2eResult<()> {
        self.resolve(target).await?;
        self.page.click(target).await
    }

    pub async fn focus(&self, target: &ElementTarget) -> E2eResult<()> {
        self.resolve(target).await?;
        self.page.focus(target).await
    }

    /// One keystroke per character, `per_key_delay` apart, so the
    /// application sees discrete input events
    pub async fn type_slowly(
        &self,
        target: &ElementTarget,
        text: &str,
        per_key_delay: Duration,
    ) -> E2eResult<()> {
        self.resolve(target).await?;

        let mut buf = [0u8; 4];
        for (i, ch) in text.chars().enumerate() {
            if i > 0 {
                tokio::time::sleep(per_key_delay).await;
            }
            self.page.type_text(target, ch.encode_utf8(&mut buf)).await?;
        }
        Ok(())
    }

    /// Dispatch a named key; focus is the caller's business
    pub async fn press_key(&self, target: &ElementTarget, key: &str) -> E2eResult<()> {
        self.resolve(target).await?;
        self.page.press(target, key).await
    }

    /// Implicit action-wait followed by the exactly-one check
    pub async fn resolve(&self, target: &ElementTarget) -> E2eResult<()> {
        self.waiter
            .wait_attached(self.page, target, Some(self.action_timeout))
            .await?
            .into_result()?;

        match self.page.count(target).await? {
            1 => Ok(()),
            matched => Err(E2eError::Resolution {
                target: target.to_string(),
                matched,
            }),
        }
    }
}

/// Join relative URLs onto the base URL
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), url)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("http://localhost:3000", "/", "http://localhost:3000/" ; "root")]
    #[test_case("http://localhost:3000/", "/setup", "http://localhost:3000/setup" ; "trailing slash on base")]
    #[test_case("http://localhost:3000", "setup", "http://localhost:3000/setup" ; "bare relative")]
    #[test_case("http://localhost:3000", "https://example.com/x", "https://example.com/x" ; "absolute passes through")]
    fn test_resolve_url(base: &str, url: &str, expected: &str) {
        assert_eq!(resolve_url(base, url), expected);
    }
}

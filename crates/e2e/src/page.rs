//! The browser automation seam
//!
//! The orchestrator only talks to these traits. [`crate::playwright`] is the
//! production implementation; tests plug in a simulated page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::ElementTarget;
use crate::mock::InstalledRule;

/// One entry of a rendered list, as seen in the DOM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub text: String,
    pub selected: bool,
}

/// Opens isolated pages; each scenario run owns exactly one
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>>;
}

/// A single browser page.
///
/// Element-level methods act on a target that the caller has already
/// resolved to exactly one element; implementations still report
/// [`crate::E2eError::Resolution`] if the DOM changed in between, and
/// [`crate::E2eError::NotAttached`] when the element has gone away.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Number of elements the target currently matches
    async fn count(&self, target: &ElementTarget) -> E2eResult<usize>;

    /// Whether any element whose text is exactly `text` (case-sensitive) is rendered
    async fn has_text(&self, text: &str) -> E2eResult<bool>;

    async fn is_visible(&self, target: &ElementTarget) -> E2eResult<bool>;
    async fn inner_text(&self, target: &ElementTarget) -> E2eResult<String>;
    async fn input_value(&self, target: &ElementTarget) -> E2eResult<String>;
    async fn attribute(&self, target: &ElementTarget, name: &str) -> E2eResult<Option<String>>;

    /// Text and selected state of every element the target matches, in DOM order
    async fn list_entries(&self, target: &ElementTarget) -> E2eResult<Vec<ListEntry>>;

    async fn fill(&self, target: &ElementTarget, value: &str) -> E2eResult<()>;
    async fn click(&self, target: &ElementTarget) -> E2eResult<()>;
    async fn focus(&self, target: &ElementTarget) -> E2eResult<()>;

    /// Emit keystrokes for `text` with no delay of its own
    async fn type_text(&self, target: &ElementTarget, text: &str) -> E2eResult<()>;

    /// Dispatch one named key (`ArrowDown`, `Enter`, ...)
    async fn press(&self, target: &ElementTarget, key: &str) -> E2eResult<()>;

    /// Start fulfilling every request matching the rule with its canned response
    async fn route(&self, rule: &InstalledRule) -> E2eResult<()>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> E2eResult<Vec<u8>>;

    async fn close(&self) -> E2eResult<()>;
}

//! UI Flow Verification Harness
//!
//! This crate drives a real browser through scripted user flows and checks
//! that the application reaches the expected states:
//! - Waits for DOM conditions with bounded polling instead of fixed sleeps
//! - Mocks backend endpoints so flows are deterministic
//! - Types keystroke by keystroke to exercise debounce and autocomplete
//! - Checks keyboard navigation of suggestion lists against a reference model
//! - Captures labelled screenshots at checkpoints and on failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Flow Verification Harness                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteRunner                                                │
//! │    ├── AppHandle::start() (optional app launch)             │
//! │    ├── run_scenarios([Scenario]) -> TestSuiteResult         │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FlowOrchestrator (one page per run, fail-fast)             │
//! │    ├── NetworkMock        install rules before step 0       │
//! │    ├── InteractionDriver  navigate/fill/click/type/press    │
//! │    ├── ConditionWaiter    poll predicates until deadline    │
//! │    ├── SelectionListModel mirror the suggestion list        │
//! │    └── DiagnosticsRecorder checkpoint + error screenshots   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page / Browser traits                                      │
//! │    └── PlaywrightBrowser -> node bridge.js (JSON lines)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod locator;
pub mod mock;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenarios;
pub mod selection;
pub mod spec;
pub mod wait;

pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use locator::ElementTarget;
pub use mock::{MockRule, NetworkMock};
pub use page::{Browser, Page};
pub use runner::{FlowOrchestrator, RunState, ScenarioReport, SuiteRunner};
pub use selection::{ListKey, SelectionListModel, SelectionListState};
pub use spec::{Predicate, Scenario, Step};
pub use wait::{ConditionWaiter, WaitOutcome};

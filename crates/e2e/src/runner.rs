//! Scenario execution
//!
//! [`FlowOrchestrator`] runs one scenario as a fail-fast state machine
//! (`Pending -> Running(i) -> Succeeded | Failed`). Each run gets its own
//! page, mock registry and diagnostics recorder, so running the same
//! scenario twice yields two independent runs. [`SuiteRunner`] runs many
//! scenarios one after another and writes the JSON results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::diagnostics::{DiagnosticArtifact, DiagnosticsRecorder};
use crate::driver::InteractionDriver;
use crate::error::{E2eError, E2eResult};
use crate::locator::ElementTarget;
use crate::mock::NetworkMock;
use crate::page::{Browser, ListEntry, Page};
use crate::scenarios;
use crate::selection::{ListKey, SelectionListModel, SelectionListState};
use crate::spec::{Observable, Predicate, Scenario, Step, SuggestionListBinding};
use crate::wait::ConditionWaiter;

/// Where a scenario run is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { step: usize },
    Succeeded,
    Failed {
        reason: String,
        artifact: Option<PathBuf>,
    },
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub step_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub state: RunState,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub artifacts: Vec<DiagnosticArtifact>,
    /// This run's own diagnostics directory
    pub artifacts_dir: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
}

impl ScenarioReport {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RunState::Pending,
            duration_ms: 0,
            steps: Vec::new(),
            artifacts: Vec::new(),
            artifacts_dir: None,
            manifest: None,
        }
    }

    pub fn success(&self) -> bool {
        self.state == RunState::Succeeded
    }

    pub fn artifact_labels(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.label.as_str()).collect()
    }
}

/// A finished run: the report plus the failure, if any
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub report: ScenarioReport,
    pub error: Option<E2eError>,
}

struct FailedStep {
    index: usize,
    step: String,
    cause: E2eError,
}

/// Runs scenarios against pages from a [`Browser`]
pub struct FlowOrchestrator {
    browser: Arc<dyn Browser>,
    waiter: ConditionWaiter,
    action_timeout: Duration,
    base_url: String,
    diagnostics_dir: PathBuf,
}

impl FlowOrchestrator {
    pub fn new(browser: Arc<dyn Browser>, config: &HarnessConfig) -> Self {
        Self {
            browser,
            waiter: ConditionWaiter::new(config.timeouts.wait(), config.timeouts.poll_interval()),
            action_timeout: config.timeouts.action(),
            base_url: config.base_url.clone(),
            diagnostics_dir: config.diagnostics_dir.clone(),
        }
    }

    /// Run a scenario, surfacing the first failure as an error
    pub async fn run(&self, scenario: &Scenario) -> E2eResult<ScenarioReport> {
        let outcome = self.execute(scenario).await;
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(outcome.report),
        }
    }

    /// Run a scenario and always hand back its report
    pub async fn execute(&self, scenario: &Scenario) -> ScenarioOutcome {
        let start = Instant::now();
        let mut report = ScenarioReport::pending(&scenario.name);
        info!("Running scenario: {}", scenario.name);

        // Setup errors surface before any step runs and need no page.
        let mock = match prepare_mocks(scenario) {
            Ok(mock) => mock,
            Err(e) => return finish_early(report, e, start),
        };
        let page = match self.browser.new_page().await {
            Ok(page) => page,
            Err(e) => return finish_early(report, e, start),
        };

        let started = match install_routes(page.as_ref(), &mock).await {
            Ok(()) => DiagnosticsRecorder::start(&self.diagnostics_dir, &scenario.name),
            Err(e) => Err(e),
        };
        let mut recorder = match started {
            Ok(recorder) => recorder,
            Err(e) => {
                close_page(page.as_ref(), &scenario.name).await;
                return finish_early(report, e, start);
            }
        };
        report.artifacts_dir = Some(recorder.dir().to_path_buf());

        let result = self
            .drive(scenario, page.as_ref(), &mut recorder, &mut report)
            .await;

        let error = match result {
            Ok(()) => {
                report.state = RunState::Succeeded;
                None
            }
            Err(failed) => {
                let artifact = recorder.capture_error(page.as_ref()).await.map(|a| a.path);
                report.state = RunState::Failed {
                    reason: failed.cause.to_string(),
                    artifact: artifact.clone(),
                };
                Some(E2eError::StepFailed {
                    scenario: scenario.name.clone(),
                    index: failed.index,
                    step: failed.step,
                    cause: Box::new(failed.cause),
                    artifact,
                })
            }
        };

        close_page(page.as_ref(), &scenario.name).await;

        match recorder.flush() {
            Ok(manifest) => report.manifest = Some(manifest),
            Err(e) => warn!("{}", E2eError::Capture(format!("flush failed: {}", e))),
        }
        report.artifacts = recorder.artifacts().to_vec();
        report.duration_ms = start.elapsed().as_millis() as u64;

        match &error {
            None => info!("✓ {} ({} ms)", report.name, report.duration_ms),
            Some(e) => error!("✗ {} - {}", report.name, e),
        }
        ScenarioOutcome { report, error }
    }

    async fn drive(
        &self,
        scenario: &Scenario,
        page: &dyn Page,
        recorder: &mut DiagnosticsRecorder,
        report: &mut ScenarioReport,
    ) -> Result<(), FailedStep> {
        let driver = InteractionDriver::new(page, &self.waiter, self.action_timeout, &self.base_url);
        let mut tracker = scenario.suggestion_list.as_ref().map(SuggestionTracker::new);

        for (index, step) in scenario.steps.iter().enumerate() {
            report.state = RunState::Running { step: index };
            let step_name = step.name();
            debug!("[{}] step {}: {}", scenario.name, index, step_name);

            let step_start = Instant::now();
            let result = self.execute_step(step, &driver, recorder, tracker.as_mut()).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match result {
                Ok(screenshot_path) => report.steps.push(StepResult {
                    index,
                    step_name,
                    success: true,
                    duration_ms,
                    error: None,
                    screenshot_path,
                }),
                Err(cause) => {
                    report.steps.push(StepResult {
                        index,
                        step_name: step_name.clone(),
                        success: false,
                        duration_ms,
                        error: Some(cause.to_string()),
                        screenshot_path: None,
                    });
                    return Err(FailedStep { index, step: step_name, cause });
                }
            }
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &Step,
        driver: &InteractionDriver<'_>,
        recorder: &mut DiagnosticsRecorder,
        tracker: Option<&mut SuggestionTracker<'_>>,
    ) -> E2eResult<Option<PathBuf>> {
        let page = driver.page();

        match step {
            Step::Navigate { url } => driver.navigate(url).await?,
            Step::Fill { target, value } => {
                driver.fill(target, value).await?;
                if let Some(tracker) = tracker {
                    tracker.after_input(page, target).await?;
                }
            }
            Step::Click { target } => {
                driver.click(target).await?;
                if let Some(tracker) = tracker {
                    tracker.after_click(page, &self.waiter, target).await?;
                }
            }
            Step::Focus { target } => driver.focus(target).await?,
            Step::TypeSlowly { target, text, per_key_delay_ms } => {
                driver
                    .type_slowly(target, text, Duration::from_millis(*per_key_delay_ms))
                    .await?;
                if let Some(tracker) = tracker {
                    tracker.after_input(page, target).await?;
                }
            }
            Step::PressKey { target, key } => {
                driver.press_key(target, key).await?;
                if let Some(tracker) = tracker {
                    tracker.after_key(page, &self.waiter, target, key).await?;
                }
            }
            Step::WaitFor { predicate, timeout_ms } => {
                let timeout = timeout_ms.map(Duration::from_millis);
                self.waiter
                    .wait_for(page, predicate, timeout)
                    .await?
                    .into_result()?;
                if let Some(tracker) = tracker {
                    tracker.after_wait(page, &self.waiter, predicate).await?;
                }
            }
            Step::AssertEquals { observe, expected } => {
                driver.resolve(observe.target()).await?;
                let actual = observe_once(page, observe).await?;
                if actual != *expected {
                    return Err(E2eError::AssertionMismatch {
                        subject: observe.to_string(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
            Step::Screenshot { label } => {
                let artifact = recorder.capture(page, label).await;
                return Ok(artifact.map(|a| a.path));
            }
            Step::Log { message } => info!("[SCENARIO LOG] {}", message),
        }
        Ok(None)
    }
}

fn prepare_mocks(scenario: &Scenario) -> E2eResult<NetworkMock> {
    scenario.validate()?;
    let mut mock = NetworkMock::new();
    for rule in &scenario.mocks {
        mock.install(rule.clone())?;
    }
    Ok(mock)
}

async fn install_routes(page: &dyn Page, mock: &NetworkMock) -> E2eResult<()> {
    for rule in mock.rules() {
        page.route(rule).await.map_err(|e| {
            E2eError::MockSetup(format!("installing {}: {}", rule.rule.pattern, e))
        })?;
    }
    Ok(())
}

async fn close_page(page: &dyn Page, scenario: &str) {
    if let Err(e) = page.close().await {
        warn!("Failed to close page for {}: {}", scenario, e);
    }
}

fn finish_early(mut report: ScenarioReport, error: E2eError, start: Instant) -> ScenarioOutcome {
    error!("✗ {} - {}", report.name, error);
    report.state = RunState::Failed {
        reason: error.to_string(),
        artifact: None,
    };
    report.duration_ms = start.elapsed().as_millis() as u64;
    ScenarioOutcome { report, error: Some(error) }
}

/// Read an observable once
async fn observe_once(page: &dyn Page, observe: &Observable) -> E2eResult<String> {
    match observe {
        Observable::Text { target } => Ok(page.inner_text(target).await?.trim().to_string()),
        Observable::Value { target } => page.input_value(target).await,
        Observable::Attribute { target, name } => {
            Ok(page.attribute(target, name).await?.unwrap_or_default())
        }
    }
}

/// Keeps the selection model in step with what the scenario does to the page
struct SuggestionTracker<'s> {
    binding: &'s SuggestionListBinding,
    model: SelectionListModel,
}

impl<'s> SuggestionTracker<'s> {
    fn new(binding: &'s SuggestionListBinding) -> Self {
        Self {
            binding,
            model: SelectionListModel::new(binding.min_query_len),
        }
    }

    async fn after_input(&mut self, page: &dyn Page, target: &ElementTarget) -> E2eResult<()> {
        if *target != self.binding.input {
            return Ok(());
        }
        let query = page.input_value(target).await?;
        self.model.input_changed(&query);
        debug!("Suggestion input is now {:?}", query);
        Ok(())
    }

    async fn after_wait(
        &mut self,
        page: &dyn Page,
        waiter: &ConditionWaiter,
        predicate: &Predicate,
    ) -> E2eResult<()> {
        let opened = matches!(predicate, Predicate::Visible { target } if *target == self.binding.listbox);
        if !opened || *self.model.state() != SelectionListState::Closed {
            return Ok(());
        }

        let entries = page.list_entries(&self.binding.options()).await?;
        self.model.open(entries.into_iter().map(|e| e.text).collect())?;
        info!("Suggestion list opened: {}", self.model.state());
        self.verify(page, waiter).await
    }

    async fn after_key(
        &mut self,
        page: &dyn Page,
        waiter: &ConditionWaiter,
        target: &ElementTarget,
        key: &str,
    ) -> E2eResult<()> {
        if *target != self.binding.input {
            return Ok(());
        }
        let Some(key) = ListKey::from_name(key) else {
            return Ok(());
        };
        if self.model.press(key) {
            debug!("Suggestion list is now {}", self.model.state());
        }
        self.verify(page, waiter).await
    }

    async fn after_click(
        &mut self,
        page: &dyn Page,
        waiter: &ConditionWaiter,
        target: &ElementTarget,
    ) -> E2eResult<()> {
        let Some(index) = target
            .role_name(&self.binding.option_role)
            .and_then(|name| self.model.position(name))
        else {
            return Ok(());
        };
        self.model.click(index)?;
        self.verify(page, waiter).await
    }

    /// Wait until the DOM agrees with the model
    async fn verify(&self, page: &dyn Page, waiter: &ConditionWaiter) -> E2eResult<()> {
        match self.model.state() {
            SelectionListState::Closed => Ok(()),
            SelectionListState::Open { items, .. } => {
                let expected: Vec<ListEntry> = items
                    .iter()
                    .map(|i| ListEntry { text: i.text.clone(), selected: i.selected })
                    .collect();
                let options = self.binding.options();
                let (options, wanted) = (&options, &expected);

                let outcome = waiter
                    .poll("suggestion selection", waiter.default_timeout(), || async move {
                        Ok::<_, E2eError>(page.list_entries(options).await? == *wanted)
                    })
                    .await?;
                if outcome.is_satisfied() {
                    return Ok(());
                }

                let actual = page.list_entries(options).await?;
                Err(E2eError::AssertionMismatch {
                    subject: "suggestion selection".into(),
                    expected: describe_entries(&expected),
                    actual: describe_entries(&actual),
                })
            }
            SelectionListState::Committed { value } => {
                let input = &self.binding.input;
                let outcome = waiter
                    .poll("committed suggestion", waiter.default_timeout(), || async move {
                        Ok::<_, E2eError>(page.input_value(input).await? == *value)
                    })
                    .await?;
                if outcome.is_satisfied() {
                    return Ok(());
                }

                Err(E2eError::AssertionMismatch {
                    subject: format!("value of {}", input),
                    expected: value.clone(),
                    actual: page.input_value(input).await?,
                })
            }
        }
    }
}

/// `[a, *b, c]` with the selected entry starred
fn describe_entries(entries: &[ListEntry]) -> String {
    let parts: Vec<String> = entries
        .iter()
        .map(|e| if e.selected { format!("*{}", e.text) } else { e.text.clone() })
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioReport>,
}

/// Runs a set of scenarios sequentially and records the results
pub struct SuiteRunner {
    orchestrator: FlowOrchestrator,
    scenarios_dir: Option<PathBuf>,
    output_dir: PathBuf,
}

impl SuiteRunner {
    pub fn new(browser: Arc<dyn Browser>, config: &HarnessConfig) -> Self {
        Self {
            orchestrator: FlowOrchestrator::new(browser, config),
            scenarios_dir: config.scenarios_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn orchestrator(&self) -> &FlowOrchestrator {
        &self.orchestrator
    }

    /// YAML scenarios from the configured directory, or the built-in flows
    pub fn load_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        match &self.scenarios_dir {
            Some(dir) => Scenario::load_all(dir),
            None => scenarios::builtin(),
        }
    }

    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let scenarios = self.load_scenarios()?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = self.load_scenarios()?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&filtered).await)
    }

    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenario = self
            .load_scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;
        Ok(self.run_scenarios(std::slice::from_ref(&scenario)).await)
    }

    /// Run scenarios one at a time; a failure does not stop the suite
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> TestSuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());

        info!("Running {} scenario(s)...", scenarios.len());
        for scenario in scenarios {
            results.push(self.orchestrator.execute(scenario).await.report);
        }

        let passed = results.iter().filter(|r| r.success()).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("Scenario results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        TestSuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Write suite results to `test-results.json`
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.output_dir, results)
    }
}

pub fn write_results(output_dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

//! Simulated interview setup application
//!
//! A [`FakeBrowser`] hands out pages that behave like the real setup screen:
//! a labelled "Target Role" input with debounced suggestions fetched from
//! `/api/suggestions`, a keyboard-navigable listbox, and the interview
//! screen behind "Begin Interview". Requests only succeed when a mock rule
//! routed through [`Page::route`] answers them.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use uiflow_e2e::config::{HarnessConfig, TimeoutConfig};
use uiflow_e2e::mock::{InstalledRule, NetworkMock};
use uiflow_e2e::page::{Browser, ListEntry, Page};
use uiflow_e2e::{E2eError, E2eResult, ElementTarget};

pub const ORIGIN: &str = "http://localhost:3000";
pub const DEBOUNCE: Duration = Duration::from_millis(300);
const MIN_QUERY_LEN: usize = 3;

/// Deliberate misbehaviour to check that failures are caught
#[derive(Debug, Clone, Default)]
pub struct Quirks {
    /// ArrowDown on the last suggestion jumps back to the first
    pub wrap_highlight: bool,
    /// Arrow keys never move the highlight
    pub ignore_arrow_keys: bool,
    /// The setup form renders "Begin Interview" twice
    pub duplicate_begin_button: bool,
    /// Every screenshot attempt fails
    pub broken_screenshots: bool,
}

/// Counters shared by every page of one browser
#[derive(Debug, Default)]
pub struct Observations {
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub requests: Mutex<Vec<String>>,
    pub navigations: Mutex<Vec<String>>,
}

pub struct FakeBrowser {
    quirks: Quirks,
    observed: Arc<Observations>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::with_quirks(Quirks::default())
    }

    pub fn with_quirks(quirks: Quirks) -> Self {
        Self {
            quirks,
            observed: Arc::new(Observations::default()),
        }
    }

    pub fn pages_opened(&self) -> usize {
        self.observed.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.observed.pages_closed.load(Ordering::SeqCst)
    }

    /// URLs the application requested, mocked or not
    pub fn requests(&self) -> Vec<String> {
        self.observed.requests.lock().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.observed.navigations.lock().clone()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        self.observed.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            quirks: self.quirks.clone(),
            observed: self.observed.clone(),
            state: Mutex::new(AppState::default()),
            network: Mutex::new(NetworkMock::new()),
        }))
    }
}

/// Harness configuration pointed at the simulated app with short timeouts
pub fn config(diagnostics_dir: &Path) -> HarnessConfig {
    HarnessConfig {
        base_url: ORIGIN.to_string(),
        diagnostics_dir: diagnostics_dir.to_path_buf(),
        output_dir: diagnostics_dir.join("results"),
        timeouts: TimeoutConfig {
            wait_ms: 2_000,
            action_ms: 1_000,
            poll_interval_ms: 50,
        },
        ..HarnessConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Blank,
    Setup,
    Interview,
    Connecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Label,
    Input,
    BeginButton,
    StartButton,
    Listbox,
    Option(usize),
    ConnectingText,
}

#[derive(Debug, Default)]
struct AppState {
    screen: Screen,
    value: String,
    focused: bool,
    pending_since: Option<Instant>,
    suggestions: Vec<String>,
    list_open: bool,
    highlight: Option<usize>,
    closed: bool,
}

impl AppState {
    fn nodes(&self, quirks: &Quirks) -> Vec<Node> {
        match self.screen {
            Screen::Blank => vec![],
            Screen::Setup => {
                let mut nodes = vec![Node::Label, Node::Input, Node::BeginButton];
                if quirks.duplicate_begin_button {
                    nodes.push(Node::BeginButton);
                }
                if self.list_open {
                    nodes.push(Node::Listbox);
                    nodes.extend((0..self.suggestions.len()).map(Node::Option));
                }
                nodes
            }
            Screen::Interview => vec![Node::StartButton],
            Screen::Connecting => vec![Node::ConnectingText],
        }
    }

    fn role(&self, node: Node) -> Option<&'static str> {
        match node {
            Node::Input => Some("textbox"),
            Node::BeginButton | Node::StartButton => Some("button"),
            Node::Listbox => Some("listbox"),
            Node::Option(_) => Some("option"),
            Node::Label | Node::ConnectingText => None,
        }
    }

    fn text(&self, node: Node) -> String {
        match node {
            Node::Label => "Target Role".into(),
            Node::Input => String::new(),
            Node::BeginButton => "Begin Interview".into(),
            Node::StartButton => "Start Interview".into(),
            Node::Listbox => self.suggestions.join("\n"),
            Node::Option(i) => self.suggestions.get(i).cloned().unwrap_or_default(),
            Node::ConnectingText => "Connecting to interviewer...".into(),
        }
    }

    fn accessible_name(&self, node: Node) -> String {
        match node {
            Node::Input => "Target Role".into(),
            other => self.text(other),
        }
    }

    fn is_selected(&self, node: Node) -> bool {
        matches!(node, Node::Option(i) if self.highlight == Some(i))
    }

    fn matches(&self, quirks: &Quirks, target: &ElementTarget) -> Vec<Node> {
        self.nodes(quirks)
            .into_iter()
            .filter(|&node| match target {
                ElementTarget::Css { selector } => match selector.as_str() {
                    "input#target-role" => node == Node::Input,
                    "button" => self.role(node) == Some("button"),
                    _ => false,
                },
                ElementTarget::Role { role, name, selected } => {
                    self.role(node) == Some(role.as_str())
                        && name.as_ref().map_or(true, |n| self.accessible_name(node) == *n)
                        && selected.map_or(true, |s| self.is_selected(node) == s)
                }
                ElementTarget::Label { text } => node == Node::Input && text == "Target Role",
                ElementTarget::Text { text } => node != Node::Input && self.text(node) == *text,
            })
            .collect()
    }

    fn single(&self, quirks: &Quirks, target: &ElementTarget) -> E2eResult<Node> {
        match self.matches(quirks, target).as_slice() {
            [] => Err(E2eError::NotAttached(target.to_string())),
            [node] => Ok(*node),
            many => Err(E2eError::Resolution {
                target: target.to_string(),
                matched: many.len(),
            }),
        }
    }

    fn input_changed(&mut self) {
        self.list_open = false;
        self.highlight = None;
        if self.value.chars().count() < MIN_QUERY_LEN {
            self.suggestions.clear();
            self.pending_since = None;
        } else {
            self.pending_since = Some(Instant::now());
        }
    }

    fn commit(&mut self, index: usize) {
        if let Some(text) = self.suggestions.get(index).cloned() {
            self.value = text;
        }
        self.suggestions.clear();
        self.list_open = false;
        self.highlight = None;
        self.pending_since = None;
    }

    fn press(&mut self, quirks: &Quirks, key: &str) {
        let count = self.suggestions.len();
        match key {
            "ArrowDown" | "ArrowUp" if !self.list_open || quirks.ignore_arrow_keys => {}
            "ArrowDown" => {
                self.highlight = match self.highlight {
                    None => Some(0),
                    Some(i) if i + 1 < count => Some(i + 1),
                    Some(_) if quirks.wrap_highlight => Some(0),
                    Some(i) => Some(i),
                }
            }
            "ArrowUp" => self.highlight = self.highlight.map(|i| i.saturating_sub(1)),
            "Enter" => {
                if let (true, Some(i)) = (self.list_open, self.highlight) {
                    self.commit(i);
                }
            }
            "Escape" => {
                self.list_open = false;
                self.highlight = None;
            }
            _ => {}
        }
    }
}

struct FakePage {
    quirks: Quirks,
    observed: Arc<Observations>,
    state: Mutex<AppState>,
    network: Mutex<NetworkMock>,
}

impl FakePage {
    /// Run the app's timers, then hand out its state
    fn with_state<T>(&self, f: impl FnOnce(&mut AppState) -> E2eResult<T>) -> E2eResult<T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(E2eError::BridgeClosed);
        }
        self.settle(&mut state);
        f(&mut state)
    }

    fn settle(&self, state: &mut AppState) {
        let Some(since) = state.pending_since else {
            return;
        };
        if since.elapsed() < DEBOUNCE {
            return;
        }
        state.pending_since = None;

        let url = format!("{}/api/suggestions", ORIGIN);
        self.observed.requests.lock().push(url.clone());

        let suggestions: Vec<String> = self
            .network
            .lock()
            .intercept(&url)
            .filter(|response| response.status == 200)
            .and_then(|response| serde_json::from_str::<serde_json::Value>(&response.body).ok())
            .and_then(|body| {
                body["suggestions"].as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(String::from))
                        .collect()
                })
            })
            .unwrap_or_default();

        state.list_open = !suggestions.is_empty();
        state.suggestions = suggestions;
        state.highlight = None;
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.observed.navigations.lock().push(url.to_string());
        self.with_state(|state| {
            if !url.starts_with(ORIGIN) {
                return Err(E2eError::Playwright(format!("net::ERR_CONNECTION_REFUSED at {}", url)));
            }
            *state = AppState {
                screen: Screen::Setup,
                ..AppState::default()
            };
            Ok(())
        })
    }

    async fn count(&self, target: &ElementTarget) -> E2eResult<usize> {
        self.with_state(|state| Ok(state.matches(&self.quirks, target).len()))
    }

    async fn has_text(&self, text: &str) -> E2eResult<bool> {
        self.with_state(|state| {
            Ok(state
                .nodes(&self.quirks)
                .into_iter()
                .any(|node| node != Node::Input && state.text(node) == text))
        })
    }

    async fn is_visible(&self, target: &ElementTarget) -> E2eResult<bool> {
        self.with_state(|state| state.single(&self.quirks, target).map(|_| true))
    }

    async fn inner_text(&self, target: &ElementTarget) -> E2eResult<String> {
        self.with_state(|state| {
            let node = state.single(&self.quirks, target)?;
            Ok(state.text(node))
        })
    }

    async fn input_value(&self, target: &ElementTarget) -> E2eResult<String> {
        self.with_state(|state| match state.single(&self.quirks, target)? {
            Node::Input => Ok(state.value.clone()),
            _ => Err(E2eError::Playwright("Error: Not an <input> element".into())),
        })
    }

    async fn attribute(&self, target: &ElementTarget, name: &str) -> E2eResult<Option<String>> {
        self.with_state(|state| {
            let node = state.single(&self.quirks, target)?;
            Ok(match (node, name) {
                (Node::Option(_), "aria-selected") => Some(state.is_selected(node).to_string()),
                (Node::Input, "value") => Some(state.value.clone()),
                (Node::Input, "id") => Some("target-role".into()),
                _ => None,
            })
        })
    }

    async fn list_entries(&self, target: &ElementTarget) -> E2eResult<Vec<ListEntry>> {
        self.with_state(|state| {
            Ok(state
                .matches(&self.quirks, target)
                .into_iter()
                .map(|node| ListEntry {
                    text: state.text(node),
                    selected: state.is_selected(node),
                })
                .collect())
        })
    }

    async fn fill(&self, target: &ElementTarget, value: &str) -> E2eResult<()> {
        self.with_state(|state| match state.single(&self.quirks, target)? {
            Node::Input => {
                state.value = value.to_string();
                state.input_changed();
                Ok(())
            }
            _ => Err(E2eError::Playwright("Error: Element is not an <input>".into())),
        })
    }

    async fn click(&self, target: &ElementTarget) -> E2eResult<()> {
        self.with_state(|state| {
            match state.single(&self.quirks, target)? {
                Node::BeginButton if !state.value.trim().is_empty() => {
                    state.screen = Screen::Interview;
                }
                Node::StartButton => state.screen = Screen::Connecting,
                Node::Option(i) => state.commit(i),
                Node::Input => state.focused = true,
                _ => {}
            }
            Ok(())
        })
    }

    async fn focus(&self, target: &ElementTarget) -> E2eResult<()> {
        self.with_state(|state| {
            state.focused = state.single(&self.quirks, target)? == Node::Input;
            Ok(())
        })
    }

    async fn type_text(&self, target: &ElementTarget, text: &str) -> E2eResult<()> {
        self.with_state(|state| match state.single(&self.quirks, target)? {
            Node::Input => {
                state.value.push_str(text);
                state.input_changed();
                Ok(())
            }
            _ => Err(E2eError::Playwright("Error: Element is not editable".into())),
        })
    }

    async fn press(&self, target: &ElementTarget, key: &str) -> E2eResult<()> {
        self.with_state(|state| {
            if state.single(&self.quirks, target)? == Node::Input {
                state.press(&self.quirks, key);
            }
            Ok(())
        })
    }

    async fn route(&self, rule: &InstalledRule) -> E2eResult<()> {
        self.with_state(|_| Ok(()))?;
        self.network.lock().install(rule.rule.clone())?;
        Ok(())
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        if self.quirks.broken_screenshots {
            return Err(E2eError::Playwright("page.screenshot: Target crashed".into()));
        }
        self.with_state(|state| {
            let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
            bytes.extend(format!("{:?}|{}|{:?}", state.screen, state.value, state.highlight).bytes());
            Ok(bytes)
        })
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.observed.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

//! Playwright browser automation
//!
//! Each page is a Node.js process running the embedded bridge script, which
//! owns one Playwright browser, context and page. Commands go out as JSON
//! lines on stdin; replies and page events come back on stdout and are
//! demultiplexed by a reader task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::ElementTarget;
use crate::mock::InstalledRule;
use crate::page::{Browser, ListEntry, Page};

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// How long `close` waits for the bridge to exit before killing it
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" => Ok(BrowserKind::Webkit),
            other => Err(E2eError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node.js executable
    pub node_binary: String,

    /// `node_modules` directory that contains `playwright`
    pub node_modules: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: "node".to_string(),
            node_modules: PathBuf::from("node_modules"),
        }
    }
}

/// Launches one bridge process per page
pub struct PlaywrightBrowser {
    config: PlaywrightConfig,
    action_timeout: Duration,
    script_dir: TempDir,
}

impl PlaywrightBrowser {
    pub fn new(config: PlaywrightConfig, action_timeout: Duration) -> E2eResult<Self> {
        Self::check_playwright_installed(&config)?;

        let script_dir = tempfile::tempdir()?;
        std::fs::write(script_dir.path().join("bridge.js"), BRIDGE_SCRIPT)?;

        Ok(Self {
            config,
            action_timeout,
            script_dir,
        })
    }

    /// Check that Node.js can load the Playwright package
    fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .args(["-e", "require('playwright')"])
            .env("NODE_PATH", node_path(config))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

fn node_path(config: &PlaywrightConfig) -> PathBuf {
    if config.node_modules.is_absolute() {
        return config.node_modules.clone();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&config.node_modules))
        .unwrap_or_else(|_| config.node_modules.clone())
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        let script = self.script_dir.path().join("bridge.js");
        debug!("Starting Playwright bridge: {}", script.display());

        let mut child = TokioCommand::new(&self.config.node_binary)
            .arg(&script)
            .env("NODE_PATH", node_path(&self.config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let page = PlaywrightPage::attach(&mut child)?;
        *page.child.lock() = Some(child);

        page.call(
            "launch",
            json!({
                "browser": self.config.browser.as_str(),
                "headless": self.config.headless,
                "width": self.config.viewport_width,
                "height": self.config.viewport_height,
                "actionTimeout": self.action_timeout.as_millis() as u64,
            }),
        )
        .await?;

        info!("Playwright {} page ready", self.config.browser.as_str());
        Ok(Box::new(page))
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// One line written by the bridge
#[derive(Debug, Deserialize)]
struct BridgeLine {
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    error: Option<BridgeFailure>,
    event: Option<String>,
    #[serde(default)]
    level: String,
    #[serde(default)]
    text: String,
    url: Option<String>,
    rule: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct BridgeFailure {
    kind: String,
    message: String,
    #[serde(default)]
    matched: usize,
}

#[derive(Debug)]
struct Reply {
    ok: bool,
    result: Value,
    error: Option<BridgeFailure>,
}

/// A page backed by a running bridge process
pub struct PlaywrightPage {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: Pending,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
}

impl PlaywrightPage {
    fn attach(child: &mut Child) -> E2eResult<Self> {
        let stdin = child.stdin.take().ok_or(E2eError::BridgeClosed)?;
        let stdout = child.stdout.take().ok_or(E2eError::BridgeClosed)?;
        let stderr = child.stderr.take().ok_or(E2eError::BridgeClosed)?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let replies = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                dispatch(&line, &replies);
            }
            // Dropping the senders fails every in-flight call with BridgeClosed.
            replies.lock().clear();
            debug!("Playwright bridge stdout closed");
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "playwright_bridge", "{}", line);
            }
        });

        Ok(Self {
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            child: Mutex::new(None),
        })
    }

    async fn call(&self, cmd: &str, args: Value) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut message = json!({ "id": id, "cmd": cmd });
        if let (Some(message), Value::Object(args)) = (message.as_object_mut(), args) {
            message.extend(args);
        }
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let started = Instant::now();

        {
            let mut stdin = self.stdin.lock().await;
            let stdin = stdin.as_mut().ok_or(E2eError::BridgeClosed)?;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
        }

        let reply = rx.await.map_err(|_| E2eError::BridgeClosed)?;
        if reply.ok {
            return Ok(reply.result);
        }

        let failure = reply.error.unwrap_or(BridgeFailure {
            kind: "other".into(),
            message: format!("{} failed without an error", cmd),
            matched: 0,
        });
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Err(failure_to_error(failure, &args_target(&message), elapsed_ms))
    }

    async fn call_on(&self, cmd: &str, target: &ElementTarget, mut args: Value) -> E2eResult<Value> {
        if let Some(obj) = args.as_object_mut() {
            obj.insert("target".into(), serde_json::to_value(target)?);
        }
        self.call(cmd, args).await
    }
}

fn args_target(message: &Value) -> String {
    message
        .get("target")
        .and_then(|t| serde_json::from_value::<ElementTarget>(t.clone()).ok())
        .map(|t| t.to_string())
        .unwrap_or_default()
}

/// Map a bridge failure; `elapsed_ms` is how long the command ran
fn failure_to_error(failure: BridgeFailure, target: &str, elapsed_ms: u64) -> E2eError {
    let target = if target.is_empty() { failure.message.clone() } else { target.to_string() };
    match failure.kind.as_str() {
        "not_attached" => E2eError::NotAttached(target),
        "resolution" => E2eError::Resolution { target, matched: failure.matched },
        "timeout" => E2eError::Timeout { description: failure.message, elapsed_ms },
        _ => E2eError::Playwright(failure.message),
    }
}

fn dispatch(line: &str, pending: &Pending) {
    let parsed: BridgeLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(_) => {
            debug!(target: "playwright_bridge", "{}", line);
            return;
        }
    };

    match parsed.event.as_deref() {
        Some("console") => {
            info!(target: "browser_console", "Browser Console [{}]: {}", parsed.level, parsed.text);
        }
        Some("route") => {
            info!(
                "Intercepted request to {} (mock {})",
                parsed.url.as_deref().unwrap_or("?"),
                parsed.rule.unwrap_or_default()
            );
        }
        Some(other) => debug!("Ignoring bridge event '{}'", other),
        None => {
            let Some(id) = parsed.id else {
                warn!("Bridge reply without id: {}", line);
                return;
            };
            if let Some(tx) = pending.lock().remove(&id) {
                let _ = tx.send(Reply {
                    ok: parsed.ok,
                    result: parsed.result,
                    error: parsed.error,
                });
            }
        }
    }
}

fn as_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.call("goto", json!({ "url": url })).await?;
        Ok(())
    }

    async fn count(&self, target: &ElementTarget) -> E2eResult<usize> {
        let value = self.call_on("count", target, json!({})).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn has_text(&self, text: &str) -> E2eResult<bool> {
        let value = self.call("has_text", json!({ "text": text })).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_visible(&self, target: &ElementTarget) -> E2eResult<bool> {
        let value = self.call_on("visible", target, json!({})).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn inner_text(&self, target: &ElementTarget) -> E2eResult<String> {
        Ok(as_string(self.call_on("inner_text", target, json!({})).await?))
    }

    async fn input_value(&self, target: &ElementTarget) -> E2eResult<String> {
        Ok(as_string(self.call_on("input_value", target, json!({})).await?))
    }

    async fn attribute(&self, target: &ElementTarget, name: &str) -> E2eResult<Option<String>> {
        let value = self.call_on("attribute", target, json!({ "name": name })).await?;
        Ok(match value {
            Value::Null => None,
            other => Some(as_string(other)),
        })
    }

    async fn list_entries(&self, target: &ElementTarget) -> E2eResult<Vec<ListEntry>> {
        let value = self.call_on("list", target, json!({})).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fill(&self, target: &ElementTarget, value: &str) -> E2eResult<()> {
        self.call_on("fill", target, json!({ "value": value })).await?;
        Ok(())
    }

    async fn click(&self, target: &ElementTarget) -> E2eResult<()> {
        self.call_on("click", target, json!({})).await?;
        Ok(())
    }

    async fn focus(&self, target: &ElementTarget) -> E2eResult<()> {
        self.call_on("focus", target, json!({})).await?;
        Ok(())
    }

    async fn type_text(&self, target: &ElementTarget, text: &str) -> E2eResult<()> {
        self.call_on("type", target, json!({ "text": text })).await?;
        Ok(())
    }

    async fn press(&self, target: &ElementTarget, key: &str) -> E2eResult<()> {
        self.call_on("press", target, json!({ "key": key })).await?;
        Ok(())
    }

    async fn route(&self, rule: &InstalledRule) -> E2eResult<()> {
        self.call(
            "route",
            json!({
                "rule": rule.id,
                "pattern": rule.rule.pattern,
                "status": rule.rule.status,
                "contentType": rule.rule.content_type,
                "body": rule.body,
            }),
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        let encoded = as_string(self.call("screenshot", json!({})).await?);
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| E2eError::Playwright(format!("screenshot is not base64: {}", e)))
    }

    async fn close(&self) -> E2eResult<()> {
        let closed = self.call("close", json!({})).await;

        // EOF on stdin lets the bridge exit on its own.
        self.stdin.lock().await.take();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Playwright bridge did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }

        closed.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping() {
        let failure = |kind: &str, matched| BridgeFailure {
            kind: kind.into(),
            message: "boom".into(),
            matched,
        };

        assert!(matches!(
            failure_to_error(failure("not_attached", 0), "role=listbox", 5),
            E2eError::NotAttached(t) if t == "role=listbox"
        ));
        assert!(matches!(
            failure_to_error(failure("resolution", 3), "role=option", 5),
            E2eError::Resolution { matched: 3, .. }
        ));
        assert!(matches!(
            failure_to_error(failure("timeout", 0), "", 5_012),
            E2eError::Timeout { elapsed_ms: 5_012, .. }
        ));
        assert!(matches!(
            failure_to_error(failure("other", 0), "", 5),
            E2eError::Playwright(m) if m == "boom"
        ));
    }

    #[tokio::test]
    async fn test_dispatch_routes_replies_by_id() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().insert(7, tx);

        dispatch(r#"{"event":"console","level":"log","text":"hello"}"#, &pending);
        dispatch("not json at all", &pending);
        assert_eq!(pending.lock().len(), 1);

        dispatch(r#"{"id":7,"ok":true,"result":3}"#, &pending);
        let reply = rx.await.unwrap();
        assert!(reply.ok);
        assert_eq!(reply.result, json!(3));
        assert!(pending.lock().is_empty());
    }

    #[test]
    fn test_args_target_describes_locator() {
        let message = json!({
            "id": 1,
            "cmd": "click",
            "target": { "by": "role", "role": "button", "name": "Begin Interview" }
        });
        assert_eq!(args_target(&message), "role=button[name=\"Begin Interview\"]");
        assert_eq!(args_target(&json!({ "id": 2 })), "");
    }

    #[test]
    fn test_browser_kind_parse() {
        assert_eq!("webkit".parse::<BrowserKind>().unwrap(), BrowserKind::Webkit);
        assert!("netscape".parse::<BrowserKind>().is_err());
    }

    #[test]
    fn test_bridge_text_lookups_are_exact() {
        assert!(BRIDGE_SCRIPT.contains("page.getByText(msg.text, { exact: true })"));
        assert!(BRIDGE_SCRIPT.contains("page.getByText(t.text, { exact: true })"));
        assert!(!BRIDGE_SCRIPT.contains("getByText(msg.text)"));
    }

    #[test]
    fn test_bridge_script_handles_every_command() {
        for cmd in [
            "launch", "goto", "count", "has_text", "visible", "inner_text", "input_value",
            "attribute", "list", "fill", "click", "focus", "type", "press", "route",
            "screenshot", "close",
        ] {
            assert!(
                BRIDGE_SCRIPT.contains(&format!("async {}(", cmd)),
                "bridge has no handler for {}",
                cmd
            );
        }
    }
}

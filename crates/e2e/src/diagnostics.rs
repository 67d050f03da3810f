//! Diagnostic screenshots for checkpoints and failures
//!
//! Capture is best-effort: a failed capture is logged and swallowed so it can
//! never mask the failure that triggered it. Artifacts stay in memory for the
//! duration of a run and are persisted by [`DiagnosticsRecorder::flush`].

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::Page;

/// Label reserved for the automatic capture on step failure
pub const ERROR_LABEL: &str = "error";

/// A captured screenshot. Write-once: never mutated after capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticArtifact {
    pub label: String,
    pub captured_at: DateTime<Utc>,
    /// Where the image is (or will be) persisted
    pub path: PathBuf,
    pub sha256: String,
    #[serde(skip)]
    bytes: Vec<u8>,
}

impl DiagnosticArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    scenario: &'a str,
    artifacts: &'a [DiagnosticArtifact],
}

/// Directory name of one run, e.g. `20261016T093012.417Z`
const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Collects screenshots for one scenario run
#[derive(Debug)]
pub struct DiagnosticsRecorder {
    scenario: String,
    dir: PathBuf,
    artifacts: Vec<DiagnosticArtifact>,
}

impl DiagnosticsRecorder {
    /// Reserve a fresh `<root>/<scenario>/<run-id>/` directory for one run.
    ///
    /// Earlier runs of the same scenario keep their own directories.
    pub fn start(root: &Path, scenario: &str) -> E2eResult<Self> {
        let dir = reserve_run_dir(&root.join(scenario))?;
        Ok(Self {
            scenario: scenario.to_string(),
            dir,
            artifacts: Vec::new(),
        })
    }

    /// This run's directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifacts(&self) -> &[DiagnosticArtifact] {
        &self.artifacts
    }

    /// Capture a labelled checkpoint; `None` if the capture failed
    pub async fn capture(&mut self, page: &dyn Page, label: &str) -> Option<DiagnosticArtifact> {
        let bytes = self.screenshot(page, label).await?;
        let artifact = self.record(label, bytes);
        info!("Captured '{}' for {}", artifact.label, self.scenario);
        Some(artifact)
    }

    /// The automatic capture made once when a step fails.
    ///
    /// Always stored under the bare [`ERROR_LABEL`]; a second call hands back
    /// the first capture.
    pub async fn capture_error(&mut self, page: &dyn Page) -> Option<DiagnosticArtifact> {
        if let Some(existing) = self.artifacts.iter().find(|a| a.label == ERROR_LABEL) {
            warn!("'{}' already captured for {}", ERROR_LABEL, self.scenario);
            return Some(existing.clone());
        }
        let bytes = self.screenshot(page, ERROR_LABEL).await?;
        let artifact = self.store(ERROR_LABEL.to_string(), bytes);
        info!("Captured '{}' for {}", artifact.label, self.scenario);
        Some(artifact)
    }

    async fn screenshot(&self, page: &dyn Page, label: &str) -> Option<Vec<u8>> {
        match page.screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                let err = E2eError::Capture(format!("'{}' for {}: {}", label, self.scenario, e));
                warn!("{}", err);
                None
            }
        }
    }

    /// Store a checkpoint under a label no other artifact of this run uses
    fn record(&mut self, label: &str, bytes: Vec<u8>) -> DiagnosticArtifact {
        let label = self.unique_label(label);
        self.store(label, bytes)
    }

    fn store(&mut self, label: String, bytes: Vec<u8>) -> DiagnosticArtifact {
        let artifact = DiagnosticArtifact {
            path: self.dir.join(format!("{}.png", label)),
            sha256: hex::encode(Sha256::digest(&bytes)),
            captured_at: Utc::now(),
            label,
            bytes,
        };
        self.artifacts.push(artifact.clone());
        artifact
    }

    /// Checkpoints never get the bare error label
    fn unique_label(&self, label: &str) -> String {
        let taken = |l: &str| l == ERROR_LABEL || self.artifacts.iter().any(|a| a.label == l);
        if !taken(label) {
            return label.to_string();
        }
        (2..)
            .map(|n| format!("{}-{}", label, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| label.to_string())
    }

    /// Write every artifact plus `manifest.json`; returns the manifest path.
    ///
    /// Files are created, never overwritten.
    pub fn flush(&self) -> E2eResult<PathBuf> {
        for artifact in &self.artifacts {
            write_new(&artifact.path, &artifact.bytes)?;
        }

        let manifest_path = self.dir.join("manifest.json");
        let manifest = Manifest {
            scenario: &self.scenario,
            artifacts: &self.artifacts,
        };
        write_new(&manifest_path, serde_json::to_string_pretty(&manifest)?.as_bytes())?;

        info!(
            "Wrote {} diagnostic artifact(s) to {}",
            self.artifacts.len(),
            self.dir.display()
        );
        Ok(manifest_path)
    }
}

/// Create a run directory that did not exist before, suffixing on collision
fn reserve_run_dir(scenario_dir: &Path) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(scenario_dir)?;
    let run_id = Utc::now().format(RUN_ID_FORMAT).to_string();

    let mut attempt = 1;
    loop {
        let candidate = match attempt {
            1 => scenario_dir.join(&run_id),
            n => scenario_dir.join(format!("{}-{}", run_id, n)),
        };
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> E2eResult<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

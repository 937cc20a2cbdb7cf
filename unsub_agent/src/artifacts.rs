//! Screenshot persistence and the outcome audit trail.

use crate::error::AgentResult;
use base64::Engine;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use unsub_agent_types::{Artifact, UnsubscribeOutcome};

/// Name of the JSON-lines audit file inside the artifacts directory.
pub const AUDIT_FILE: &str = "outcomes.jsonl";

/// Which side of the action a screenshot was taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before acting.
    Before,
    /// After acting.
    After,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

/// Writes screenshots to disk and always returns the inline copy.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    dir: Option<PathBuf>,
    audit_log: bool,
}

impl ArtifactStore {
    /// A store rooted at `dir`; inline-only when `None`.
    pub fn new(dir: Option<PathBuf>, audit_log: bool) -> Self {
        Self { dir, audit_log }
    }

    /// The artifacts directory, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Encode a PNG and persist it as `<timestamp>-<slug>-<phase>.png`.
    ///
    /// A failed write is logged; the inline copy is still returned.
    pub async fn save(&self, png: &[u8], url: &str, phase: Phase) -> Artifact {
        let now = Utc::now();
        let mut artifact = Artifact {
            path: None,
            base64: base64::engine::general_purpose::STANDARD.encode(png),
            captured_at: now.to_rfc3339(),
        };

        if let Some(dir) = &self.dir {
            let name = format!(
                "{}-{}-{}.png",
                now.format("%Y%m%dT%H%M%S%.3fZ"),
                slug(url),
                phase.as_str()
            );
            let path = dir.join(name);
            match write_file(dir, &path, png).await {
                Ok(()) => artifact.path = Some(path),
                Err(e) => log::warn!("could not write {}: {}", path.display(), e),
            }
        }

        artifact
    }

    /// Append one outcome to the audit file, without inline images.
    pub async fn record(&self, outcome: &UnsubscribeOutcome) -> AgentResult<()> {
        let Some(dir) = self.dir.as_ref().filter(|_| self.audit_log) else {
            return Ok(());
        };

        let mut line = serde_json::to_vec(&outcome.for_audit())?;
        line.push(b'\n');

        tokio::fs::create_dir_all(dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(AUDIT_FILE))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

async fn write_file(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, bytes).await
}

/// File-name-safe form of a URL's host and path.
fn slug(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);

    let mut out = String::with_capacity(rest.len().min(60));
    for c in rest.chars() {
        if out.len() >= 60 {
            break;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }

    let out = out.trim_matches('-');
    if out.is_empty() {
        "page".to_string()
    } else {
        out.to_string()
    }
}

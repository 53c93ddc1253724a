//! Run reporting and audit artifacts
//!
//! - `RunReporter`: fire-and-forget run status updates (status file, webhook)
//! - `AuditLog`: append-only JSON-lines log of every reverted file
//! - `RunSummary`: machine-readable end-of-run summary

use crate::cache::CacheStats;
use crate::models::{RunAudit, RunStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Receives run status updates. Implementations must swallow their own
/// failures: reporting never affects the run.
pub trait RunReporter: Send + Sync {
    fn report(&self, status: RunStatus, stats: &RunAudit, error_message: Option<&str>);
}

/// Discards every update
pub struct NoopReporter;

impl RunReporter for NoopReporter {
    fn report(&self, _status: RunStatus, _stats: &RunAudit, _error_message: Option<&str>) {}
}

/// Fans updates out to several reporters
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn RunReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Box<dyn RunReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl RunReporter for MultiReporter {
    fn report(&self, status: RunStatus, stats: &RunAudit, error_message: Option<&str>) {
        for reporter in &self.reporters {
            reporter.report(status, stats, error_message);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: RunStatus,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stats: RunAudit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Overwrites a JSON status file on every update
pub struct StatusFileReporter {
    path: PathBuf,
    target: String,
    started_at: DateTime<Utc>,
}

impl StatusFileReporter {
    pub fn new(path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            started_at: Utc::now(),
        }
    }

    fn write(&self, record: &StatusRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl RunReporter for StatusFileReporter {
    fn report(&self, status: RunStatus, stats: &RunAudit, error_message: Option<&str>) {
        let record = StatusRecord {
            status,
            target: self.target.clone(),
            started_at: self.started_at,
            updated_at: Utc::now(),
            stats: stats.clone(),
            error_message: error_message.map(str::to_string),
        };
        if let Err(e) = self.write(&record) {
            warn!("Could not write status file: {}", e);
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    run_id: &'a str,
    status: RunStatus,
    stats: &'a RunAudit,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    timestamp: DateTime<Utc>,
}

/// POSTs run updates to a tracking endpoint
pub struct WebhookReporter {
    url: String,
    run_id: String,
    agent: ureq::Agent,
}

impl WebhookReporter {
    pub fn new(url: impl Into<String>, run_id: impl Into<String>) -> Self {
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(10)))
            .build()
            .new_agent();
        Self {
            url: url.into(),
            run_id: run_id.into(),
            agent,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl RunReporter for WebhookReporter {
    fn report(&self, status: RunStatus, stats: &RunAudit, error_message: Option<&str>) {
        let payload = WebhookPayload {
            run_id: &self.run_id,
            status,
            stats,
            error_message,
            timestamp: Utc::now(),
        };

        match self.agent.post(self.url.as_str()).send_json(&payload) {
            Ok(resp) if resp.status().as_u16() < 400 => {
                debug!("Reported run {} as {}", self.run_id, status)
            }
            Ok(resp) => warn!("Run update rejected: HTTP {}", resp.status().as_u16()),
            Err(e) => warn!("Run update failed: {}", e),
        }
    }
}

/// One reverted file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub file: String,
    pub error: String,
}

/// Append-only JSON-lines log of reverted files
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, file: &Path, diagnostic: &str) -> Result<()> {
        let record = AuditRecord {
            timestamp: Utc::now(),
            file: file.display().to_string(),
            error: if diagnostic.trim().is_empty() {
                "Syntax/Validation Error".to_string()
            } else {
                diagnostic.to_string()
            },
        };
        let line = serde_json::to_string(&record)?;

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        writeln!(out, "{}", line)?;
        Ok(())
    }

    /// Read every record back (used by tooling and tests)
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).context("Malformed audit record"))
            .collect()
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(flatten)]
    pub audit: RunAudit,
    pub target: String,
    pub success_rate: f64,
    pub execution_time_seconds: f64,
    pub cache_stats: CacheStats,
    pub concurrency: usize,
    pub completion_time: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(
        audit: RunAudit,
        target: impl Into<String>,
        elapsed: Duration,
        cache_stats: CacheStats,
        concurrency: usize,
    ) -> Self {
        Self {
            success_rate: (audit.success_rate() * 100.0).round() / 100.0,
            audit,
            target: target.into(),
            execution_time_seconds: (elapsed.as_secs_f64() * 10.0).round() / 10.0,
            cache_stats,
            concurrency,
            completion_time: Utc::now(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

//! Run configuration
//!
//! Loaded from, in increasing priority:
//! 1. Built-in defaults
//! 2. User config (~/.config/codevolve/config.toml)
//! 3. Project config (./codevolve.toml)
//! 4. Environment variables (`CODEVOLVE_*`)
//! 5. CLI flags (applied by the binary)

use crate::ai::{AiConfig, LlmBackend, RetryPolicy};
use crate::validate::ValidationMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Project config file name
pub const CONFIG_FILE_NAME: &str = "codevolve.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolveConfig {
    /// Maximum simultaneous model calls
    pub llm_concurrency: usize,
    /// Files processed concurrently per batch
    pub file_concurrency: usize,
    /// Retries after a rate-limit response
    pub max_retries: u32,
    /// Backoff base delay; doubles on each retry
    pub backoff_base_ms: u64,
    pub validation: ValidationMode,
    pub docker_image: String,
    /// Functions under both thresholds are too simple to evolve
    pub min_lines: usize,
    pub min_chars: usize,
    /// Source extension to evolve
    pub extension: String,
    pub audit_log: PathBuf,
    pub summary_file: PathBuf,
    pub status_file: PathBuf,
    pub ai: AiSettings,
}

impl Default for EvolveConfig {
    fn default() -> Self {
        Self {
            llm_concurrency: 2,
            file_concurrency: 3,
            max_retries: 3,
            backoff_base_ms: 10_000,
            validation: ValidationMode::Local,
            docker_image: "node:20-slim".to_string(),
            min_lines: 4,
            min_chars: 60,
            extension: "js".to_string(),
            audit_log: PathBuf::from("validation_audit.log"),
            summary_file: PathBuf::from("dashboard_data.json"),
            status_file: PathBuf::from("run_status.json"),
            ai: AiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub backend: LlmBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        let defaults = AiConfig::default();
        Self {
            backend: defaults.backend,
            model: defaults.model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }
}

impl EvolveConfig {
    /// Load config from all file and environment sources
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(user) = Self::user_config_path().filter(|p| p.exists()) {
            layers.push(user);
        }
        let project = project_dir.join(CONFIG_FILE_NAME);
        if project.exists() {
            layers.push(project);
        }

        let mut config = Self::from_files(&layers)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("codevolve").join("config.toml"))
    }

    /// Layer TOML files over the defaults; later files win key by key
    pub fn from_files(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Value::try_from(Self::default())
            .context("Failed to serialize default config")?;

        for path in paths {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let layer: toml::Value = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            merge_values(&mut merged, layer);
            // Check each layer so a bad value names the file it came from
            merged
                .clone()
                .try_into::<Self>()
                .with_context(|| format!("Invalid value in {}", path.display()))?;
            debug!("Loaded config layer {}", path.display());
        }

        merged
            .try_into()
            .context("Config has invalid values")
    }

    /// Apply `CODEVOLVE_*` overrides; unparsable values are ignored
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring invalid {}={}", key, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed(&lookup, "CODEVOLVE_LLM_CONCURRENCY") {
            self.llm_concurrency = v;
        }
        if let Some(v) = parsed(&lookup, "CODEVOLVE_FILE_CONCURRENCY") {
            self.file_concurrency = v;
        }
        if let Some(v) = parsed(&lookup, "CODEVOLVE_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = parsed(&lookup, "CODEVOLVE_BACKOFF_MS") {
            self.backoff_base_ms = v;
        }
        if let Some(v) = parsed(&lookup, "CODEVOLVE_VALIDATION") {
            self.validation = v;
        }
        if let Some(v) = parsed(&lookup, "CODEVOLVE_BACKEND") {
            self.ai.backend = v;
        }
        if let Some(model) = lookup("CODEVOLVE_MODEL").filter(|m| !m.trim().is_empty()) {
            self.ai.model = Some(model);
        }
    }

    /// Clamp values that would stall the pipeline
    pub fn normalize(&mut self) {
        self.llm_concurrency = self.llm_concurrency.max(1);
        self.file_concurrency = self.file_concurrency.max(1);
        let ext = self.extension.trim_start_matches('.').to_string();
        self.extension = if ext.is_empty() { "js".to_string() } else { ext };
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
        }
    }

    pub fn ai_config(&self) -> AiConfig {
        AiConfig {
            backend: self.ai.backend,
            model: self.ai.model.clone(),
            max_tokens: self.ai.max_tokens,
            temperature: self.ai.temperature,
        }
    }

    /// Write an example project config. Returns false if one already exists.
    pub fn init_project_config(dir: &Path) -> Result<(PathBuf, bool)> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Ok((path, false));
        }
        std::fs::write(&path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok((path, true))
    }
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

const EXAMPLE_CONFIG: &str = r#"# Codevolve configuration

# Maximum simultaneous model calls
# llm_concurrency = 2

# Files evolved concurrently per batch
# file_concurrency = 3

# Rate-limit retries and backoff base (doubles each retry)
# max_retries = 3
# backoff_base_ms = 10000

# Syntax check: "local" (node --check) or "docker" (falls back to local)
# validation = "local"
# docker_image = "node:20-slim"

# Functions under BOTH thresholds are skipped as too simple
# min_lines = 4
# min_chars = 60

# Artifacts
# audit_log = "validation_audit.log"
# summary_file = "dashboard_data.json"
# status_file = "run_status.json"

[ai]
# Backend: groq (default), anthropic, openai, deepinfra, openrouter, ollama
# API keys come from the environment, e.g. GROQ_API_KEY
# backend = "groq"
# model = "llama-3.3-70b-versatile"
# temperature = 0.1
# max_tokens = 4096
"#;

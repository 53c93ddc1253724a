//! External syntax checking via `node --check`
//!
//! Runs locally or inside a throwaway Docker container with a pinned Node
//! image. Docker mode falls back to local when the daemon is unreachable.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

static LINE_REF: OnceLock<Regex> = OnceLock::new();

fn line_ref() -> &'static Regex {
    LINE_REF.get_or_init(|| Regex::new(r":(\d+)").expect("line regex is valid"))
}

/// Result of a syntax check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok,
    Failed { diagnostic: String },
}

impl CheckOutcome {
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        CheckOutcome::Failed {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CheckOutcome::Ok)
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            CheckOutcome::Ok => None,
            CheckOutcome::Failed { diagnostic } => Some(diagnostic),
        }
    }

    /// First `:<line>` reference in the diagnostic, if any
    pub fn error_line(&self) -> Option<u32> {
        let diagnostic = self.diagnostic()?;
        line_ref()
            .captures(diagnostic)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// Syntax-check capability. Blocking; callers run it off the async runtime.
pub trait SyntaxChecker: Send + Sync {
    fn check(&self, root: &Path, relative: &Path) -> CheckOutcome;
}

/// Where `node --check` runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    #[default]
    Local,
    Docker,
}

impl std::str::FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ValidationMode::Local),
            "docker" => Ok(ValidationMode::Docker),
            other => Err(format!("unknown validation mode '{}'", other)),
        }
    }
}

/// `node --check` runner
#[derive(Debug, Clone)]
pub struct NodeChecker {
    mode: ValidationMode,
    image: String,
}

impl NodeChecker {
    pub fn local() -> Self {
        Self {
            mode: ValidationMode::Local,
            image: String::new(),
        }
    }

    /// Resolve the requested mode, probing the Docker daemon once
    pub fn detect(requested: ValidationMode, image: impl Into<String>) -> Self {
        let image = image.into();
        match requested {
            ValidationMode::Local => {
                info!("Validator: using local node --check");
                Self::local()
            }
            ValidationMode::Docker if docker_available() => {
                info!("Validator: Docker daemon detected, using containerised validation ({})", image);
                Self {
                    mode: ValidationMode::Docker,
                    image,
                }
            }
            ValidationMode::Docker => {
                warn!("Validator: Docker requested but daemon is not running, falling back to local node --check");
                Self::local()
            }
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    fn command(&self, root: &Path, relative: &Path) -> Command {
        match self.mode {
            ValidationMode::Local => {
                let mut cmd = Command::new("node");
                cmd.arg("--check").arg(root.join(relative));
                cmd
            }
            ValidationMode::Docker => {
                let absolute = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
                let internal = relative.to_string_lossy().replace('\\', "/");
                let mut cmd = Command::new("docker");
                cmd.args(["run", "--rm", "-v"])
                    .arg(format!("{}:/app", absolute.display()))
                    .args(["-w", "/app"])
                    .arg(&self.image)
                    .args(["node", "--check"])
                    .arg(internal);
                cmd
            }
        }
    }
}

impl SyntaxChecker for NodeChecker {
    fn check(&self, root: &Path, relative: &Path) -> CheckOutcome {
        let output = self.command(root, relative).stdin(Stdio::null()).output();
        let outcome = outcome_from(output);
        match &outcome {
            CheckOutcome::Ok => debug!("Validation passed ({:?}): {}", self.mode, relative.display()),
            CheckOutcome::Failed { diagnostic } => {
                warn!("Validation failed ({:?}) for {}: {}", self.mode, relative.display(), diagnostic.trim())
            }
        }
        outcome
    }
}

fn docker_available() -> bool {
    Command::new("docker")
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn outcome_from(output: std::io::Result<Output>) -> CheckOutcome {
    match output {
        Ok(out) if out.status.success() => CheckOutcome::Ok,
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stdout = String::from_utf8_lossy(&out.stdout);
            let diagnostic = if !stderr.trim().is_empty() {
                stderr.to_string()
            } else if !stdout.trim().is_empty() {
                stdout.to_string()
            } else {
                format!("syntax check exited with {}", out.status)
            };
            CheckOutcome::failed(diagnostic)
        }
        Err(e) => CheckOutcome::failed(format!("failed to run syntax check: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_line_extraction() {
        let outcome = CheckOutcome::failed("/work/app.js:42\n  }\n  ^\nSyntaxError: Unexpected token");
        assert_eq!(outcome.error_line(), Some(42));
        assert_eq!(CheckOutcome::failed("no location").error_line(), None);
        assert_eq!(CheckOutcome::Ok.error_line(), None);
    }

    #[test]
    fn test_spawn_error_becomes_failure() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "node not found");
        let outcome = outcome_from(Err(err));
        assert!(outcome.diagnostic().unwrap().contains("node not found"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Docker".parse::<ValidationMode>().unwrap(), ValidationMode::Docker);
        assert_eq!("local".parse::<ValidationMode>().unwrap(), ValidationMode::Local);
        assert!("podman".parse::<ValidationMode>().is_err());
    }

    #[test]
    fn test_local_command_targets_file() {
        let checker = NodeChecker::local();
        let cmd = checker.command(Path::new("/work"), Path::new("src/a.js"));
        assert_eq!(cmd.get_program(), "node");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["--check", "/work/src/a.js"]);
    }

    #[test]
    fn test_docker_command_mounts_workspace() {
        let checker = NodeChecker {
            mode: ValidationMode::Docker,
            image: "node:20-slim".to_string(),
        };
        let cmd = checker.command(Path::new("/nonexistent-root"), Path::new("src/a.js"));
        assert_eq!(cmd.get_program(), "docker");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-v",
                "/nonexistent-root:/app",
                "-w",
                "/app",
                "node:20-slim",
                "node",
                "--check",
                "src/a.js"
            ]
        );
    }
}

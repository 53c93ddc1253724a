//! CLI command definitions and handlers

mod evolve;
mod init;
mod scan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codevolve::ai::LlmBackend;
use codevolve::config::EvolveConfig;
use codevolve::validate::ValidationMode;
use std::path::{Path, PathBuf};

/// Parse and validate a concurrency limit (1-64)
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("concurrency must be at least 1".to_string())
    } else if n > 64 {
        Err("concurrency cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Codevolve - modernise legacy JavaScript with an LLM, safely
#[derive(Parser, Debug)]
#[command(name = "codevolve")]
#[command(
    version,
    about = "Rewrite legacy JavaScript functions with an LLM, keeping only rewrites that pass node --check",
    after_help = "\
Examples:
  codevolve scan ./my-app                              Show what would be evolved
  codevolve evolve ./my-app                            Evolve a local project in place
  codevolve evolve https://github.com/org/repo.git     Clone into ./workspace and evolve
  codevolve init                                       Write an example codevolve.toml

API keys are read from the environment (GROQ_API_KEY by default)."
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evolve every eligible function in a repository
    Evolve(EvolveArgs),

    /// Dry run: list candidates, scores and skip reasons without calling the model
    Scan {
        /// Local directory to scan
        target: PathBuf,
    },

    /// Write an example codevolve.toml in the current directory
    Init,
}

#[derive(clap::Args, Debug)]
pub struct EvolveArgs {
    /// Local directory (evolved in place) or git URL (cloned into --workspace)
    pub target: String,

    /// Clone destination for remote targets; wiped before cloning
    #[arg(long, default_value = "workspace")]
    pub workspace: PathBuf,

    /// Files processed concurrently per batch
    #[arg(long, value_parser = parse_concurrency)]
    pub file_concurrency: Option<usize>,

    /// Maximum simultaneous model calls
    #[arg(long, value_parser = parse_concurrency)]
    pub llm_concurrency: Option<usize>,

    /// Syntax check mode (local, docker)
    #[arg(long)]
    pub validation: Option<ValidationMode>,

    /// LLM backend (groq, anthropic, openai, deepinfra, openrouter, ollama)
    #[arg(long)]
    pub backend: Option<LlmBackend>,

    /// Model override for the selected backend
    #[arg(long)]
    pub model: Option<String>,

    /// Endpoint that receives run status updates
    #[arg(long, env = "CODEVOLVE_REPORT_URL")]
    pub report_url: Option<String>,

    /// Run identifier sent with status updates (default: random)
    #[arg(long)]
    pub run_id: Option<String>,
}

impl EvolveArgs {
    /// CLI flags are the last config layer
    fn apply_to(&self, config: &mut EvolveConfig) {
        if let Some(n) = self.file_concurrency {
            config.file_concurrency = n;
        }
        if let Some(n) = self.llm_concurrency {
            config.llm_concurrency = n;
        }
        if let Some(mode) = self.validation {
            config.validation = mode;
        }
        if let Some(backend) = self.backend {
            config.ai.backend = backend;
            // A model chosen for another backend would not exist here
            if self.model.is_none() {
                config.ai.model = None;
            }
        }
        if let Some(model) = &self.model {
            config.ai.model = Some(model.clone());
        }
        config.normalize();
    }
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => init::run(Path::new(".")),
        Commands::Scan { target } => {
            let config = EvolveConfig::load(Path::new("."))?;
            scan::run(&target, &config)
        }
        Commands::Evolve(args) => {
            let mut config = EvolveConfig::load(Path::new("."))?;
            args.apply_to(&mut config);
            evolve::run(&args, &config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concurrency_bounds() {
        assert_eq!(parse_concurrency("3"), Ok(3));
        assert!(parse_concurrency("0").is_err());
        assert!(parse_concurrency("65").is_err());
        assert!(parse_concurrency("many").is_err());
    }

    #[test]
    fn test_evolve_flags_override_config() {
        let cli = Cli::try_parse_from([
            "codevolve",
            "evolve",
            "./app",
            "--file-concurrency",
            "5",
            "--validation",
            "docker",
            "--backend",
            "anthropic",
        ])
        .unwrap();
        let Commands::Evolve(args) = cli.command else {
            panic!("expected evolve");
        };

        let mut config = EvolveConfig::default();
        config.ai.model = Some("llama-3.3-70b-versatile".to_string());
        args.apply_to(&mut config);

        assert_eq!(config.file_concurrency, 5);
        assert_eq!(config.llm_concurrency, 2);
        assert_eq!(config.validation, ValidationMode::Docker);
        assert_eq!(config.ai.backend, LlmBackend::Anthropic);
        assert_eq!(config.ai.model, None);
    }

    #[test]
    fn test_rejects_unknown_validation_mode() {
        let parsed = Cli::try_parse_from(["codevolve", "evolve", "./app", "--validation", "podman"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_log_level_is_global() {
        let cli = Cli::try_parse_from(["codevolve", "scan", ".", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
    }
}

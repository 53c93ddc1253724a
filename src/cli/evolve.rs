//! Evolve command - the full clone / evolve / validate run

use super::EvolveArgs;
use anyhow::{Context, Result};
use codevolve::ai::{AiClient, Evolver};
use codevolve::cache::CacheStats;
use codevolve::config::EvolveConfig;
use codevolve::models::{RunAudit, RunStatus};
use codevolve::pipeline::{Pipeline, PipelineSettings, RunError};
use codevolve::reporters::{
    AuditLog, MultiReporter, RunReporter, RunSummary, StatusFileReporter, WebhookReporter,
};
use codevolve::validate::{Mutator, NodeChecker};
use codevolve::workspace;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Run the evolve command
pub fn run(args: &EvolveArgs, config: &EvolveConfig) -> Result<()> {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut reporters = MultiReporter::new().with(Box::new(StatusFileReporter::new(
        &config.status_file,
        &args.target,
    )));
    if let Some(url) = &args.report_url {
        reporters = reporters.with(Box::new(WebhookReporter::new(url, &run_id)));
    }
    let reporter: Arc<dyn RunReporter> = Arc::new(reporters);

    info!("Run {} started for {}", run_id, args.target);
    reporter.report(RunStatus::Running, &RunAudit::default(), None);
    let started = Instant::now();

    match execute(args, config, Arc::clone(&reporter)) {
        Ok((audit, cache_stats)) => {
            let summary = RunSummary::new(
                audit,
                &args.target,
                started.elapsed(),
                cache_stats,
                config.file_concurrency,
            );
            // A failed summary write still reports Done
            let written = match summary.write_json(&config.summary_file) {
                Ok(()) => true,
                Err(e) => {
                    warn!("{:#}", e);
                    false
                }
            };
            print_summary(&summary, config, written);
            reporter.report(RunStatus::Done, &summary.audit, None);
            Ok(())
        }
        Err(e) => {
            let audit = e
                .downcast_ref::<RunError>()
                .map(|r| r.audit().clone())
                .unwrap_or_default();
            reporter.report(RunStatus::Error, &audit, Some(&format!("{:#}", e)));
            eprintln!("\n{} {:#}", style("Run failed:").red().bold(), e);
            Err(e)
        }
    }
}

fn execute(
    args: &EvolveArgs,
    config: &EvolveConfig,
    reporter: Arc<dyn RunReporter>,
) -> Result<(RunAudit, CacheStats)> {
    // Fail on a missing key before spending time on a clone
    let client = AiClient::from_env_with_config(config.ai_config())?;
    println!(
        "\n{} Evolving {} with {} ({})\n",
        style("⚡").cyan(),
        style(&args.target).bold(),
        client.model(),
        client.backend().display_name()
    );

    let root = acquire(&args.target, &args.workspace)?;
    let files = workspace::list_candidate_files(&root, &config.extension)?;
    info!("Found {} .{} files", files.len(), config.extension);

    let checker = NodeChecker::detect(config.validation, config.docker_image.clone());
    let evolver = Evolver::new(Arc::new(client), config.llm_concurrency, config.retry_policy());
    let pipeline = Arc::new(Pipeline::new(
        Mutator::new(&root),
        Arc::new(evolver),
        Arc::new(checker),
        Arc::new(AuditLog::new(&config.audit_log)),
        PipelineSettings::from(config),
    ));

    let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let audit = rt.block_on(pipeline.run(&files, reporter))?;
    Ok((audit, pipeline.evolver().cache_stats()))
}

fn acquire(target: &str, workspace_dir: &std::path::Path) -> Result<PathBuf> {
    if !workspace::is_remote(target) {
        return workspace::acquire(target, workspace_dir);
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Cloning {}...", target));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = workspace::acquire(target, workspace_dir);
    match &result {
        Ok(_) => spinner.finish_with_message(format!("Cloned into {}", workspace_dir.display())),
        Err(_) => spinner.finish_and_clear(),
    }
    result
}

fn print_summary(summary: &RunSummary, config: &EvolveConfig, written: bool) {
    let audit = &summary.audit;
    let cache = &summary.cache_stats;

    println!("\n{}", style("Evolution summary").bold().underlined());
    println!("  {:<26} {}", "Files scanned:", audit.total_scanned);
    println!(
        "  {:<26} {}",
        "Successful evolutions:",
        style(audit.successful_fixes).green()
    );
    println!(
        "  {:<26} {}",
        "Syntax errors prevented:",
        style(audit.syntax_errors_prevented).yellow()
    );
    println!("  {:<26} {}", "Characters saved:", audit.total_chars_saved);
    println!("  {:<26} {:.2}%", "Success rate:", summary.success_rate);
    println!(
        "  {:<26} {} hits / {} misses ({}), {} entries",
        "Cache:", cache.hits, cache.misses, cache.hit_rate, cache.cached_entries
    );
    println!("  {:<26} {:.1}s", "Execution time:", summary.execution_time_seconds);
    if written {
        println!(
            "\n  {} {}",
            style("Summary written to").dim(),
            style(config.summary_file.display()).cyan()
        );
    }
    if audit.syntax_errors_prevented > 0 {
        println!(
            "  {} {}",
            style("Reverted files logged in").dim(),
            style(config.audit_log.display()).cyan()
        );
    }
}

//! Scan command - dry-run triage of every candidate

use anyhow::{Context, Result};
use codevolve::config::EvolveConfig;
use codevolve::pipeline::{scan_file, PipelineSettings, Triage};
use codevolve::workspace;
use console::style;
use std::path::Path;
use tracing::warn;

/// Run the scan command
pub fn run(target: &Path, config: &EvolveConfig) -> Result<()> {
    let root = target
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", target.display()))?;
    let settings = PipelineSettings::from(config);
    let files = workspace::list_candidate_files(&root, &config.extension)?;

    println!(
        "\n{} Scanning {} ({} .{} files)\n",
        style("🔍").bold(),
        style(root.display()).cyan(),
        files.len(),
        config.extension
    );

    let (mut eligible, mut skipped) = (0usize, 0usize);
    for relative in &files {
        let entries = match scan_file(&root, relative, &settings) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not scan {}: {:#}", relative.display(), e);
                continue;
            }
        };
        if entries.is_empty() {
            continue;
        }

        println!("{}", style(relative.display()).bold());
        for entry in entries {
            let c = &entry.candidate;
            let span = format!("[{}..{}]", c.start_offset, c.end_offset);
            match entry.triage {
                Triage::Eligible(score) => {
                    eligible += 1;
                    println!(
                        "  {} {} {} score {}: {}",
                        style("✓").green(),
                        c.display_name(),
                        style(span).dim(),
                        style(score.score).yellow(),
                        score.reasons.join("; ")
                    );
                }
                Triage::TooSimple => {
                    skipped += 1;
                    println!("  {} {} {} too simple", style("·").dim(), c.display_name(), style(span).dim());
                }
                Triage::NoAntiPatterns => {
                    skipped += 1;
                    println!("  {} {} {} no anti-patterns", style("·").dim(), c.display_name(), style(span).dim());
                }
            }
        }
    }

    println!(
        "\n{} eligible, {} skipped. Nothing was modified.",
        style(eligible).green().bold(),
        skipped
    );
    Ok(())
}

//! Evolution pipeline
//!
//! Per file: extract -> triage -> score -> rewrite (descending offsets) ->
//! save -> validate -> (self-correct once | revert). Files run in fixed-size
//! concurrent batches; a failing file never affects its siblings.

use crate::ai::{is_balanced, AiError, Evolver};
use crate::config::EvolveConfig;
use crate::models::{FileOutcome, FunctionCandidate, RunAudit, RunStatus, ScoreResult};
use crate::parsers;
use crate::reporters::{AuditLog, RunReporter};
use crate::scoring;
use crate::validate::{CheckOutcome, FileTransaction, Mutator, SyntaxChecker};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A run that had to stop early
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Run aborted: {source}")]
    Aborted {
        /// Counters for every batch that finished
        audit: RunAudit,
        #[source]
        source: AiError,
    },
}

impl RunError {
    pub fn audit(&self) -> &RunAudit {
        match self {
            RunError::Aborted { audit, .. } => audit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub min_lines: usize,
    pub min_chars: usize,
    pub file_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&EvolveConfig::default())
    }
}

impl From<&EvolveConfig> for PipelineSettings {
    fn from(config: &EvolveConfig) -> Self {
        Self {
            min_lines: config.min_lines,
            min_chars: config.min_chars,
            file_concurrency: config.file_concurrency.max(1),
        }
    }
}

/// Why a candidate will or will not be sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triage {
    TooSimple,
    NoAntiPatterns,
    Eligible(ScoreResult),
}

impl Triage {
    pub fn of(candidate: &FunctionCandidate, settings: &PipelineSettings) -> Self {
        if candidate.is_too_simple(settings.min_lines, settings.min_chars) {
            return Triage::TooSimple;
        }
        let score = scoring::score(&candidate.body);
        if score.is_eligible() {
            Triage::Eligible(score)
        } else {
            Triage::NoAntiPatterns
        }
    }
}

/// One row of a dry-run scan
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub candidate: FunctionCandidate,
    pub triage: Triage,
}

/// Triage every candidate in a file without calling the model or writing
pub fn scan_file(root: &Path, relative: &Path, settings: &PipelineSettings) -> Result<Vec<ScanEntry>> {
    let source = Mutator::new(root).read(relative)?;
    Ok(parsers::extract_candidates(relative, &source)
        .into_iter()
        .map(|candidate| {
            let triage = Triage::of(&candidate, settings);
            ScanEntry { candidate, triage }
        })
        .collect())
}

/// A rewrite is usable if it is non-empty, actually different, and has
/// balanced brackets
fn is_acceptable(original: &str, rewrite: &str) -> bool {
    !rewrite.trim().is_empty() && rewrite != original && is_balanced(rewrite)
}

fn span_matches(content: &str, candidate: &FunctionCandidate) -> bool {
    content.get(candidate.start_offset..candidate.end_offset) == Some(candidate.body.as_str())
}

fn splice(content: &mut String, candidate: &FunctionCandidate, replacement: &str) {
    content.replace_range(candidate.start_offset..candidate.end_offset, replacement);
}

pub struct Pipeline {
    mutator: Mutator,
    evolver: Arc<Evolver>,
    checker: Arc<dyn SyntaxChecker>,
    audit_log: Arc<AuditLog>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        mutator: Mutator,
        evolver: Arc<Evolver>,
        checker: Arc<dyn SyntaxChecker>,
        audit_log: Arc<AuditLog>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            mutator,
            evolver,
            checker,
            audit_log,
            settings,
        }
    }

    pub fn evolver(&self) -> &Evolver {
        &self.evolver
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Eligible candidates, highest start offset first
    fn eligible_candidates(&self, relative: &Path, source: &str) -> Vec<FunctionCandidate> {
        let mut eligible: Vec<FunctionCandidate> = parsers::extract_candidates(relative, source)
            .into_iter()
            .filter(|candidate| match Triage::of(candidate, &self.settings) {
                Triage::TooSimple => {
                    debug!("Skipped [{}]: too simple to evolve", candidate.display_name());
                    false
                }
                Triage::NoAntiPatterns => {
                    debug!("Skipped [{}]: no anti-patterns", candidate.display_name());
                    false
                }
                Triage::Eligible(score) => {
                    debug!(
                        "Candidate [{}] score {}: {}",
                        candidate.display_name(),
                        score.score,
                        score.reasons.join(", ")
                    );
                    true
                }
            })
            .collect();

        eligible.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));
        eligible
    }

    /// Push one file through the full evolve / validate / revert cycle.
    ///
    /// Returns `Err` for I/O failures and for fatal model errors; in both
    /// cases the file is either untouched or restored from its backup.
    pub async fn process_file(&self, relative: &Path) -> Result<FileOutcome> {
        let original = self.mutator.read(relative)?;
        let candidates = self.eligible_candidates(relative, &original);
        if candidates.is_empty() {
            debug!("No eligible candidates in {}", relative.display());
            return Ok(FileOutcome::Skipped);
        }

        // Every applied span starts at or after `floor`, so earlier offsets
        // in `working` still match the original text.
        let mut working = original.clone();
        let mut floor = usize::MAX;
        let mut rewritten: Vec<&FunctionCandidate> = Vec::new();

        for candidate in &candidates {
            let name = candidate.display_name();
            if candidate.end_offset > floor {
                debug!("Skipped [{}]: encloses an already rewritten function", name);
                continue;
            }
            if !span_matches(&working, candidate) {
                warn!("Skipped [{}]: span no longer matches in {}", name, relative.display());
                continue;
            }

            let evolution = self.evolver.evolve(&candidate.name, &candidate.body).await?;
            if evolution.code == candidate.body || evolution.code.trim().is_empty() {
                continue;
            }
            if !is_balanced(&evolution.code) {
                warn!("Discarded rewrite of [{}]: unbalanced brackets", name);
                continue;
            }

            splice(&mut working, candidate, &evolution.code);
            floor = candidate.start_offset;
            rewritten.push(candidate);
        }

        if rewritten.is_empty() {
            return Ok(FileOutcome::Unchanged);
        }

        let mut tx = FileTransaction::new(self.mutator.clone(), Arc::clone(&self.checker), relative);
        self.save_or_restore(&mut tx, working)?;
        let mut outcome = tx.validate().await;
        let mut correction_attempted = false;
        let mut self_corrected = false;

        if let CheckOutcome::Failed { diagnostic } = &outcome {
            let diagnostic = diagnostic.clone();
            let pristine = tx.revert()?;
            let first = rewritten[0];
            let name = first.display_name();
            info!(
                "Attempting self-correction of [{}] in {} (error line {:?})",
                name,
                relative.display(),
                outcome.error_line()
            );

            correction_attempted = true;
            let retry = self.evolver.correct(&first.name, &first.body, &diagnostic).await?;
            if is_acceptable(&first.body, &retry.code) && span_matches(&pristine, first) {
                let mut corrected = pristine;
                splice(&mut corrected, first, &retry.code);
                self.save_or_restore(&mut tx, corrected)?;
                outcome = tx.validate().await;
                self_corrected = true;
            } else {
                info!("Self-correction of [{}] produced no usable rewrite", name);
            }
        }

        match outcome {
            CheckOutcome::Ok => {
                let final_len = tx.current_content().map(|c| c.chars().count()).unwrap_or(0);
                let chars_saved = original.chars().count() as i64 - final_len as i64;
                info!(
                    "Evolved {} ({} rewrite(s){}, {} chars saved)",
                    relative.display(),
                    if self_corrected { 1 } else { rewritten.len() },
                    if self_corrected { ", self-corrected" } else { "" },
                    chars_saved
                );
                Ok(FileOutcome::Evolved { chars_saved })
            }
            CheckOutcome::Failed { diagnostic } => {
                let reason = match (correction_attempted, self_corrected) {
                    (_, true) => "self-correction also failed validation",
                    (true, false) => "self-correction attempted, reply unusable",
                    (false, false) => "validation failed, no correction attempted",
                };
                warn!("Reverting {}: {}", relative.display(), reason);
                if let Err(e) = self.audit_log.append(relative, &diagnostic) {
                    warn!("Could not write audit record for {}: {}", relative.display(), e);
                }
                tx.revert()?;
                Ok(FileOutcome::Reverted {
                    correction_attempted,
                    self_corrected,
                })
            }
        }
    }

    /// Save, restoring the backup if the write itself failed part way
    fn save_or_restore(&self, tx: &mut FileTransaction, content: String) -> Result<()> {
        if let Err(e) = tx.save(content) {
            if tx.backup_exists() {
                tx.revert()?;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Process files in batches of `file_concurrency`.
    ///
    /// A fatal model error lets the current batch finish, then aborts with
    /// the counters gathered so far. Progress is reported after each batch,
    /// on the blocking pool since reporters may do network I/O.
    pub async fn run(
        self: &Arc<Self>,
        files: &[PathBuf],
        reporter: Arc<dyn RunReporter>,
    ) -> std::result::Result<RunAudit, RunError> {
        let batch_size = self.settings.file_concurrency.max(1);
        let total_batches = files.len().div_ceil(batch_size);
        let mut audit = RunAudit::default();

        for (index, batch) in files.chunks(batch_size).enumerate() {
            info!("Processing batch {}/{} ({} files)", index + 1, total_batches, batch.len());

            let mut tasks = JoinSet::new();
            for relative in batch {
                let this = Arc::clone(self);
                let relative = relative.clone();
                tasks.spawn(async move {
                    let result = this.process_file(&relative).await;
                    (relative, result)
                });
            }

            let mut batch_audit = RunAudit::default();
            let mut fatal: Option<AiError> = None;

            while let Some(joined) = tasks.join_next().await {
                batch_audit.record_scanned();
                match joined {
                    Ok((_, Ok(outcome))) => batch_audit.record(outcome),
                    Ok((relative, Err(e))) => match e.downcast::<AiError>() {
                        Ok(ai) if ai.is_fatal() => {
                            error!("Fatal error on {}: {}", relative.display(), ai);
                            if fatal.is_none() {
                                fatal = Some(ai);
                            }
                        }
                        Ok(ai) => warn!("Error processing {}: {}", relative.display(), ai),
                        Err(e) => warn!("Error processing {}: {:#}", relative.display(), e),
                    },
                    Err(e) => warn!("File task failed: {}", e),
                }
            }

            audit.merge(&batch_audit);
            if let Some(source) = fatal {
                return Err(RunError::Aborted { audit, source });
            }
            let progress = Arc::clone(&reporter);
            let snapshot = audit.clone();
            if let Err(e) =
                tokio::task::spawn_blocking(move || progress.report(RunStatus::Running, &snapshot, None))
                    .await
            {
                warn!("Progress report task failed: {}", e);
            }
        }

        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{RetryPolicy, TextTransform};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const LOOPY: &str = "function work(items) {\n  var total = 0;\n  for (var i = 0; i < items.length; i++) {\n    total += items[i];\n  }\n  return total;\n}\n";

    struct Echo {
        calls: AtomicUsize,
        reply: String,
    }

    impl TextTransform for Echo {
        fn transform(&self, _prompt: &str) -> crate::ai::AiResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct AlwaysOk;

    impl SyntaxChecker for AlwaysOk {
        fn check(&self, _root: &Path, _relative: &Path) -> CheckOutcome {
            CheckOutcome::Ok
        }
    }

    fn pipeline(root: &Path, reply: &str) -> (Arc<Pipeline>, Arc<Echo>) {
        let echo = Arc::new(Echo {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        });
        let evolver = Evolver::new(echo.clone(), 2, RetryPolicy::default());
        let pipeline = Pipeline::new(
            Mutator::new(root),
            Arc::new(evolver),
            Arc::new(AlwaysOk),
            Arc::new(AuditLog::new(root.join("audit.log"))),
            PipelineSettings::default(),
        );
        (Arc::new(pipeline), echo)
    }

    #[test]
    fn test_triage() {
        let settings = PipelineSettings::default();
        let tiny = FunctionCandidate {
            name: "f".into(),
            body: "function f() { var a; }".into(),
            start_offset: 0,
            end_offset: 23,
        };
        assert_eq!(Triage::of(&tiny, &settings), Triage::TooSimple);

        let clean = FunctionCandidate {
            name: "g".into(),
            body: "function g(a, b) {\n  const sum = a + b;\n  return sum * 2;\n}".into(),
            start_offset: 0,
            end_offset: 0,
        };
        assert_eq!(Triage::of(&clean, &settings), Triage::NoAntiPatterns);

        let loopy = FunctionCandidate {
            name: "work".into(),
            body: LOOPY.trim_end().into(),
            start_offset: 0,
            end_offset: 0,
        };
        assert!(matches!(Triage::of(&loopy, &settings), Triage::Eligible(s) if s.score > 0));
    }

    #[test]
    fn test_acceptance() {
        assert!(is_acceptable("function f() { var a = 1; }", "function f() { const a = 1; }"));
        assert!(!is_acceptable("x", "x"));
        assert!(!is_acceptable("x", "   "));
        assert!(!is_acceptable("x", "function f(){ return 1;"));
    }

    #[test]
    fn test_scan_file_lists_all_candidates() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), format!("{}function tiny() {{}}\n", LOOPY)).unwrap();

        let entries = scan_file(dir.path(), Path::new("a.js"), &PipelineSettings::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].triage, Triage::Eligible(_)));
        assert_eq!(entries[1].triage, Triage::TooSimple);
    }

    #[tokio::test]
    async fn test_no_rewrite_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), LOOPY).unwrap();
        // Model echoes the body back unchanged
        let (pipeline, echo) = pipeline(dir.path(), LOOPY.trim_end());

        let outcome = pipeline.process_file(Path::new("a.js")).await.unwrap();
        assert_eq!(outcome, FileOutcome::Unchanged);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("a.js.bak").exists());
    }

    #[tokio::test]
    async fn test_successful_rewrite_commits() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), LOOPY).unwrap();
        let rewrite = "function work(items) {\n  return items.reduce((a, b) => a + b, 0);\n}";
        let (pipeline, _) = pipeline(dir.path(), rewrite);

        let outcome = pipeline.process_file(Path::new("a.js")).await.unwrap();
        let expected_saved = LOOPY.chars().count() as i64 - (rewrite.len() as i64 + 1);
        assert_eq!(outcome, FileOutcome::Evolved { chars_saved: expected_saved });
        assert_eq!(fs::read_to_string(dir.path().join("a.js")).unwrap(), format!("{}\n", rewrite));
        assert_eq!(fs::read_to_string(dir.path().join("a.js.bak")).unwrap(), LOOPY);
    }

    #[tokio::test]
    async fn test_run_counts_every_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), LOOPY).unwrap();
        fs::write(dir.path().join("b.js"), "function tiny() {}\n").unwrap();
        let (pipeline, _) = pipeline(dir.path(), "function work(items) { return 0; }");

        let files = vec![PathBuf::from("a.js"), PathBuf::from("b.js"), PathBuf::from("missing.js")];
        let audit = pipeline
            .run(&files, Arc::new(crate::reporters::NoopReporter))
            .await
            .unwrap();
        assert_eq!(audit.total_scanned, 3);
        assert_eq!(audit.successful_fixes, 1);
    }
}

//! Core data models shared across the evolution pipeline

use serde::{Deserialize, Serialize};

/// A function-like unit extracted from a source file.
///
/// Offsets are byte offsets into the file content the candidate was
/// extracted from, and are only valid against that snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCandidate {
    pub name: String,
    pub body: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl FunctionCandidate {
    /// Name used in logs; anonymous functions get their offset attached
    pub fn display_name(&self) -> String {
        if self.name == crate::parsers::ANONYMOUS {
            format!("anonymous_at_{}", self.start_offset)
        } else {
            self.name.clone()
        }
    }

    pub fn line_count(&self) -> usize {
        self.body.split('\n').count()
    }

    pub fn char_count(&self) -> usize {
        self.body.chars().count()
    }

    /// Below both thresholds means there is nothing worth rewriting
    pub fn is_too_simple(&self, min_lines: usize, min_chars: usize) -> bool {
        self.line_count() < min_lines && self.char_count() < min_chars
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start_offset < end && start < self.end_offset
    }
}

/// Need-score of a function body. A score of 0 means "do not touch".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u32,
    pub reasons: Vec<String>,
}

impl ScoreResult {
    pub fn is_eligible(&self) -> bool {
        self.score > 0
    }
}

/// Run status as seen by the run-tracking collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Done,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Done => write!(f, "done"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of pushing one file through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// No eligible candidates (or unparsable file); nothing attempted
    Skipped,
    /// Candidates were attempted but none produced an accepted rewrite
    Unchanged,
    /// Rewrite validated and kept; positive means the file shrank
    Evolved { chars_saved: i64 },
    /// Validation failed and the file was restored from backup.
    /// `self_corrected` means a corrected rewrite was saved and re-checked.
    Reverted {
        correction_attempted: bool,
        self_corrected: bool,
    },
}

/// Run-wide audit counters.
///
/// Built up by merging per-file outcomes at batch boundaries, so no
/// shared mutable state is needed while files are in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAudit {
    pub total_scanned: u64,
    pub successful_fixes: u64,
    pub syntax_errors_prevented: u64,
    pub total_chars_saved: i64,
}

impl RunAudit {
    pub fn record_scanned(&mut self) {
        self.total_scanned += 1;
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Evolved { chars_saved } => {
                self.successful_fixes += 1;
                self.total_chars_saved += chars_saved;
            }
            FileOutcome::Reverted { .. } => self.syntax_errors_prevented += 1,
            FileOutcome::Skipped | FileOutcome::Unchanged => {}
        }
    }

    pub fn merge(&mut self, other: &RunAudit) {
        self.total_scanned += other.total_scanned;
        self.successful_fixes += other.successful_fixes;
        self.syntax_errors_prevented += other.syntax_errors_prevented;
        self.total_chars_saved += other.total_chars_saved;
    }

    /// Percentage of scanned files that were successfully evolved
    pub fn success_rate(&self) -> f64 {
        if self.total_scanned == 0 {
            0.0
        } else {
            self.successful_fixes as f64 / self.total_scanned as f64 * 100.0
        }
    }
}

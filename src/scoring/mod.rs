//! Optimization-need scoring
//!
//! Scores a function body against a fixed, ordered table of weighted
//! anti-pattern rules. The total is the sum of the weights of every rule
//! that matches; a total of 0 means the function is already modern and
//! must not be sent to the model.

use crate::models::ScoreResult;
use regex::Regex;
use std::sync::OnceLock;

/// A single anti-pattern rule
#[derive(Debug, Clone, Copy)]
pub struct AntiPattern {
    pub pattern: &'static str,
    pub weight: u32,
    pub reason: &'static str,
}

/// The rule table. Order is significant: reasons are reported in this order.
pub const ANTI_PATTERNS: &[AntiPattern] = &[
    AntiPattern {
        pattern: r"\bvar\s+",
        weight: 3,
        reason: "uses 'var' (should be let/const)",
    },
    AntiPattern {
        pattern: r"\.then\s*\(",
        weight: 3,
        reason: "uses .then() chain (could be async/await)",
    },
    AntiPattern {
        pattern: r"\.catch\s*\(",
        weight: 2,
        reason: "uses .catch() chain (could be async/await)",
    },
    AntiPattern {
        pattern: r#"['"]\s*\+\s*\w"#,
        weight: 2,
        reason: "uses string concatenation (could use template literals)",
    },
    AntiPattern {
        pattern: r"function\s*\(\s*err\s*,",
        weight: 3,
        reason: "uses error-first callback pattern (could be async/await)",
    },
    AntiPattern {
        pattern: r"for\s*\(\s*(var|let)\s+\w+\s*=\s*0",
        weight: 2,
        reason: "uses index for-loop (could be .map/.filter/.forEach)",
    },
    AntiPattern {
        pattern: r"\barguments\b",
        weight: 3,
        reason: "uses 'arguments' object (should use rest params)",
    },
    AntiPattern {
        pattern: r"\b(self|that)\s*=\s*this\b",
        weight: 3,
        reason: "uses self/that=this hack (use arrow functions)",
    },
    AntiPattern {
        pattern: r"Object\.assign\s*\(\s*\{\s*\}",
        weight: 1,
        reason: "uses Object.assign({}, ...) (could use spread)",
    },
    AntiPattern {
        pattern: r"\.(apply|call)\s*\(\s*(null|undefined)",
        weight: 1,
        reason: "uses .apply(null) (could use spread)",
    },
    AntiPattern {
        pattern: r"\.hasOwnProperty\s*\(",
        weight: 1,
        reason: "uses .hasOwnProperty (prefer Object.hasOwn)",
    },
    // Long if...else run is the nesting signal
    AntiPattern {
        pattern: r"(?s)if.{400,}else",
        weight: 2,
        reason: "deeply nested if/else (could use early return)",
    },
];

static COMPILED: OnceLock<Vec<(Regex, AntiPattern)>> = OnceLock::new();

fn compiled() -> &'static [(Regex, AntiPattern)] {
    COMPILED.get_or_init(|| {
        ANTI_PATTERNS
            .iter()
            .map(|rule| {
                let re = Regex::new(rule.pattern).expect("anti-pattern table is valid");
                (re, *rule)
            })
            .collect()
    })
}

/// Score a function body for optimization potential
pub fn score(body: &str) -> ScoreResult {
    let mut result = ScoreResult::default();

    for (re, rule) in compiled() {
        if re.is_match(body) {
            result.score += rule.weight;
            result.reasons.push(rule.reason.to_string());
        }
    }

    result
}

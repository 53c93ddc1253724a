//! Codevolve - syntax-safe function evolution
//!
//! Rewrites JavaScript functions with an LLM while guaranteeing that no
//! syntactically broken file is ever left behind. Every file either passes
//! validation or is restored byte-for-byte from its pre-run backup.
//!
//! Pipeline per file:
//! 1. Extract function candidates with tree-sitter (`parsers`)
//! 2. Score them against a fixed anti-pattern table (`scoring`)
//! 3. Rewrite eligible ones through a cached, rate-limited model (`ai`)
//! 4. Save, validate, and revert on failure (`validate`)
//! 5. Aggregate audit counters and report the run (`pipeline`, `reporters`)

pub mod ai;
pub mod cache;
pub mod config;
pub mod models;
pub mod parsers;
pub mod pipeline;
pub mod reporters;
pub mod scoring;
pub mod validate;
pub mod workspace;

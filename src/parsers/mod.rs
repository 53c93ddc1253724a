//! Source code parsers using tree-sitter
//!
//! Extracts rewrite candidates (function-like nodes) from source files.
//! Only JavaScript is supported; the evolution validator runs `node --check`.

pub mod javascript;

use crate::models::FunctionCandidate;
use std::path::Path;

/// Label for function-like nodes with no resolvable name
pub const ANONYMOUS: &str = "anonymous";

/// Extract candidates from a file based on its extension.
///
/// Unknown extensions and unparsable files yield an empty list.
pub fn extract_candidates(path: &Path, source: &str) -> Vec<FunctionCandidate> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        "js" | "mjs" | "cjs" | "jsx" => javascript::extract(source),
        _ => Vec::new(),
    }
}

/// Get all supported file extensions
pub fn supported_extensions() -> &'static [&'static str] {
    &["js", "mjs", "cjs", "jsx"]
}

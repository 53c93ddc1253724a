//! JavaScript candidate extraction using tree-sitter
//!
//! Walks the syntax tree in document order and yields every function-like
//! node: declarations, function expressions, arrow functions and methods.
//! Structurally identical bodies are reported once (first occurrence wins),
//! so repeated boilerplate callbacks are only sent to the model once.

use crate::models::FunctionCandidate;
use crate::parsers::ANONYMOUS;
use std::collections::HashSet;
use tracing::debug;
use tree_sitter::{Language, Node, Parser, Tree};

/// Node kinds treated as rewrite candidates
const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "generator_function",
    "arrow_function",
    "method_definition",
];

fn language() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

fn parse_tree(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&language()).ok()?;
    parser.parse(source, None)
}

/// True when the source parses without any error or missing nodes
pub fn parses_cleanly(source: &str) -> bool {
    parse_tree(source)
        .map(|tree| !tree.root_node().has_error())
        .unwrap_or(false)
}

/// Extract de-duplicated function candidates from JavaScript source.
///
/// A file that fails to parse cleanly yields no candidates.
pub fn extract(source: &str) -> Vec<FunctionCandidate> {
    let Some(tree) = parse_tree(source) else {
        return Vec::new();
    };

    let root = tree.root_node();
    if root.has_error() {
        debug!("Source contains syntax errors, no candidates extracted");
        return Vec::new();
    }

    let bytes = source.as_bytes();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut candidates = Vec::new();

    // Pre-order walk keeps document order, which decides dedup winners
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if FUNCTION_KINDS.contains(&node.kind()) {
            if let Some(body) = source.get(node.start_byte()..node.end_byte()) {
                if seen.insert(body) {
                    candidates.push(FunctionCandidate {
                        name: resolve_name(&node, bytes),
                        body: body.to_string(),
                        start_offset: node.start_byte(),
                        end_offset: node.end_byte(),
                    });
                }
            }
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    candidates
}

/// Declared names win; an arrow bound to a variable takes the variable's
/// name; everything else is anonymous.
fn resolve_name(node: &Node, source: &[u8]) -> String {
    let declared = node
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok());
    if let Some(name) = declared {
        return name.to_string();
    }

    // Only arrows inherit the name of the variable they are bound to
    if node.kind() == "arrow_function" {
        let bound = node
            .parent()
            .filter(|p| p.kind() == "variable_declarator")
            .and_then(|p| p.child_by_field_name("name"))
            .and_then(|n| n.utf8_text(source).ok());
        if let Some(name) = bound {
            return name.to_string();
        }
    }

    ANONYMOUS.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(source: &str) -> Vec<String> {
        extract(source).into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_extracts_all_four_kinds() {
        let src = r#"
function declared(a) { return a; }
const expr = function () { return 1; };
const arrow = (x) => x * 2;
class Widget {
  render() { return "<div/>"; }
}
"#;
        let found = names(src);
        assert_eq!(found, vec!["declared", "anonymous", "arrow", "render"]);
    }

    #[test]
    fn test_offsets_slice_back_to_body() {
        let src = "// header\nfunction a() { return 1; }\nconst b = () => { return 2; };\n";
        let candidates = extract(src);
        assert_eq!(candidates.len(), 2);
        for c in &candidates {
            assert_eq!(&src[c.start_offset..c.end_offset], c.body);
        }
        assert!(candidates[0].start_offset < candidates[1].start_offset);
    }

    #[test]
    fn test_offsets_are_bytes_with_multibyte_text() {
        let src = "const s = \"héllo wörld\";\nfunction after() { return s; }\n";
        let c = &extract(src)[0];
        assert_eq!(c.name, "after");
        assert_eq!(&src[c.start_offset..c.end_offset], c.body);
    }

    #[test]
    fn test_anonymous_callbacks() {
        let src = "app.get('/', function (req, res) { res.send('ok'); });\nitems.map((i) => i + 1);\n";
        let found = names(src);
        assert_eq!(found, vec![ANONYMOUS, ANONYMOUS]);
    }

    #[test]
    fn test_named_function_expression_keeps_own_name() {
        let src = "const outer = function inner() { return 1; };";
        assert_eq!(names(src), vec!["inner"]);
    }

    #[test]
    fn test_bound_function_expression_stays_anonymous() {
        let src = "const expr = function () { return 1; };\nconst gen = function* () { yield 1; };\n";
        assert_eq!(names(src), vec![ANONYMOUS, ANONYMOUS]);
    }

    #[test]
    fn test_duplicate_bodies_are_dropped() {
        let src = r#"
a.on('x', (e) => { console.log(e); });
b.on('y', (e) => { console.log(e); });
c.on('z', (e) => { console.warn(e); });
"#;
        let candidates = extract(src);
        assert_eq!(candidates.len(), 2);
        // First occurrence wins
        assert!(src[..candidates[0].start_offset].contains("a.on"));
        assert!(!src[..candidates[0].start_offset].contains("b.on"));
    }

    #[test]
    fn test_nested_functions_are_separate_candidates() {
        let src = "function outer() {\n  const inner = () => 42;\n  return inner();\n}\n";
        let candidates = extract(src);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "outer");
        assert_eq!(candidates[1].name, "inner");
        assert!(candidates[1].start_offset > candidates[0].start_offset);
        assert!(candidates[1].end_offset < candidates[0].end_offset);
    }

    #[test]
    fn test_malformed_source_yields_nothing() {
        assert!(extract("function broken( { return 1;").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_parses_cleanly() {
        assert!(parses_cleanly("function f() { return 1; }"));
        assert!(!parses_cleanly("function f() { return 1;"));
    }
}

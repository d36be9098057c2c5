//! Optional deep analysis: external type-check summary and an approximate,
//! intraprocedural call graph.
//!
//! The type checker is a black box: it returns an error count and exit
//! status, nothing more is interpreted. The call graph is name-based only;
//! no cross-file or receiver-type resolution is attempted.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use tree_sitter::Node;

use crate::index::DeepAnalysis;
use crate::indexer::external::run_with_timeout;
use crate::indexer::extractor;

/// Deadline for one type-checker invocation.
pub const TYPE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default external type checker binary.
pub const DEFAULT_TYPE_CHECKER: &str = "mypy";

/// Run deep analysis for one file. Never fails: an unavailable checker
/// yields zeros, unparsable source yields an empty call graph.
pub fn analyze(path: &Path, source: &str, checker: &str) -> DeepAnalysis {
    let (type_coverage, type_errors) = type_check(path, source, checker);
    DeepAnalysis {
        type_coverage,
        type_errors,
        call_graph: call_graph(source),
    }
}

// ---------------------------------------------------------------------------
// Type checking
// ---------------------------------------------------------------------------

fn type_check(path: &Path, source: &str, checker: &str) -> (f64, u32) {
    let path_arg = path.to_string_lossy();
    let output = match run_with_timeout(
        checker,
        &[&path_arg, "--show-error-codes", "--no-error-summary"],
        None,
        TYPE_CHECK_TIMEOUT,
    ) {
        Some(output) => output,
        None => return (0.0, 0),
    };

    let errors = output.stdout.matches("error:").count() as u32;
    if output.success {
        return (1.0, errors);
    }

    // Rough coverage estimate from error density over non-blank lines.
    let nonblank = source.lines().filter(|l| !l.trim().is_empty()).count();
    let coverage = if nonblank > 0 {
        (1.0 - (f64::from(errors) / nonblank as f64).min(1.0)).max(0.0)
    } else {
        0.0
    };
    (coverage, errors)
}

// ---------------------------------------------------------------------------
// Approximate call graph
// ---------------------------------------------------------------------------

/// Map every function definition to the names it calls, in call order and
/// deduplicated. Nested functions collect their own call lists; name
/// collisions keep the last definition, as in the symbol index.
pub fn call_graph(source: &str) -> IndexMap<String, Vec<String>> {
    let mut graph = IndexMap::new();
    let Some(tree) = extractor::parse(source) else {
        return graph;
    };
    let root = tree.root_node();
    if root.has_error() {
        return graph;
    }
    visit_functions(root, source, &mut graph);
    graph
}

fn visit_functions(node: Node, source: &str, graph: &mut IndexMap<String, Vec<String>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "function_definition" {
            if let Some(name) = child.child_by_field_name("name") {
                let name = node_text(name, source).to_string();
                let mut calls = Vec::new();
                if let Some(body) = child.child_by_field_name("body") {
                    collect_calls(body, source, &mut calls);
                }
                graph.insert(name, calls);
            }
        }
        visit_functions(child, source, graph);
    }
}

fn collect_calls(node: Node, source: &str, calls: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        // Nested definitions track their own calls.
        if child.kind() == "function_definition" {
            continue;
        }
        if child.kind() == "call" {
            if let Some(callee) = callee_name(child, source) {
                if !calls.contains(&callee) {
                    calls.push(callee);
                }
            }
        }
        collect_calls(child, source, calls);
    }
}

fn callee_name(call: Node, source: &str) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some(node_text(function, source).to_string()),
        "attribute" => function
            .child_by_field_name("attribute")
            .map(|attr| node_text(attr, source).to_string()),
        _ => None,
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_graph_tracks_direct_calls() {
        let source = "\
def main():
    setup()
    run()
    run()
";
        let graph = call_graph(source);
        assert_eq!(graph["main"], vec!["setup", "run"]);
    }

    #[test]
    fn test_call_graph_tracks_attribute_calls() {
        let source = "\
def handler(client):
    client.connect()
    client.session.close()
";
        let graph = call_graph(source);
        assert_eq!(graph["handler"], vec!["connect", "close"]);
    }

    #[test]
    fn test_nested_function_calls_attributed_to_inner() {
        let source = "\
def outer():
    def inner():
        helper()
    inner()
";
        let graph = call_graph(source);
        assert_eq!(graph["outer"], vec!["inner"]);
        assert_eq!(graph["inner"], vec!["helper"]);
    }

    #[test]
    fn test_functions_without_calls_get_empty_lists() {
        let graph = call_graph("def quiet():\n    return 1\n");
        assert_eq!(graph["quiet"], Vec::<String>::new());
    }

    #[test]
    fn test_invalid_source_yields_empty_graph() {
        assert!(call_graph("def broken(:\n").is_empty());
    }

    #[test]
    fn test_missing_checker_degrades_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let deep = analyze(&file, "x = 1\n", "definitely-not-a-type-checker");
        assert_eq!(deep.type_coverage, 0.0);
        assert_eq!(deep.type_errors, 0);
        assert!(deep.call_graph.is_empty());
    }
}

//! Structural and metric extraction for a single Python source file.
//!
//! Parsing binds the tree-sitter Python grammar; extraction walks the
//! resulting tree. Malformed source is never fatal to a scan: the file's
//! record carries an `error` string and everything else defaults to
//! empty/zero. Complexity and raw size metrics are independent sub-steps,
//! so either may degrade (empty list, all-zero metrics) without affecting
//! the other.

use tree_sitter::{Node, Parser, Tree};

use crate::index::{ComplexityEntry, Entity, EntityKind, RawMetrics};

/// Recursion guard for pathological nesting. Exceeding it degrades the
/// affected sub-step instead of overflowing the stack.
const MAX_TREE_DEPTH: usize = 256;

/// Result of extracting one file's text.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub complexity: Vec<ComplexityEntry>,
    pub raw: RawMetrics,
    pub comment_ratio: f64,
    pub error: Option<String>,
}

/// Parse Python source into a tree-sitter tree.
pub(crate) fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

/// Extract entities, complexity measurements, and raw metrics from source.
pub fn extract(source: &str) -> Extraction {
    let tree = match parse(source) {
        Some(tree) => tree,
        None => {
            return Extraction {
                error: Some("SyntaxError: invalid syntax at line 1".to_string()),
                ..Extraction::default()
            }
        }
    };

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root, 0).unwrap_or(1);
        return Extraction {
            error: Some(format!("SyntaxError: invalid syntax at line {line}")),
            ..Extraction::default()
        };
    }

    let entities = extract_entities(root, source);

    let complexity = match compute_complexity(root, source) {
        Ok(entries) => entries,
        Err(()) => {
            tracing::debug!("complexity computation degraded to empty");
            Vec::new()
        }
    };

    let raw = match compute_raw_metrics(root, source) {
        Ok(raw) => raw,
        Err(()) => {
            tracing::debug!("raw metric computation degraded to zero");
            RawMetrics::default()
        }
    };

    let comment_ratio = if raw.loc > 0 {
        round3(raw.comments as f64 / raw.loc as f64)
    } else {
        0.0
    };

    Extraction {
        entities,
        complexity,
        raw,
        comment_ratio,
        error: None,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn first_error_line(node: Node, depth: usize) -> Option<usize> {
    if depth > MAX_TREE_DEPTH {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(line) = first_error_line(child, depth + 1) {
            return Some(line);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Extract top-level classes and functions. Only direct children of the
/// module node become entities; methods appear in their class's method list
/// and nested functions are not indexed.
fn extract_entities(root: Node, source: &str) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let node = unwrap_decorated(child);
        match node.kind() {
            "function_definition" => {
                if let Some(entity) = function_entity(node, source) {
                    entities.push(entity);
                }
            }
            "class_definition" => {
                if let Some(entity) = class_entity(node, source) {
                    entities.push(entity);
                }
            }
            _ => {}
        }
    }
    entities
}

/// A `decorated_definition` indexes as its inner declaration.
fn unwrap_decorated(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

fn is_async(node: Node) -> bool {
    node.child(0).is_some_and(|c| c.kind() == "async")
}

fn function_entity(node: Node, source: &str) -> Option<Entity> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();
    let kind = if is_async(node) {
        EntityKind::AsyncFunction
    } else {
        EntityKind::Function
    };
    Some(Entity {
        kind,
        name,
        lineno: node.start_position().row + 1,
        end_lineno: node.end_position().row + 1,
        docstring: body_docstring(node, source),
        methods: None,
        bases: None,
    })
}

fn class_entity(node: Node, source: &str) -> Option<Entity> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();

    // One level only: direct function definitions in the class body.
    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let member = unwrap_decorated(child);
            if member.kind() == "function_definition" {
                if let Some(method_name) = member.child_by_field_name("name") {
                    methods.push(node_text(method_name, source).to_string());
                }
            }
        }
    }

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for base in superclasses.named_children(&mut cursor) {
            if base.kind() == "keyword_argument" {
                continue;
            }
            bases.push(node_text(base, source).to_string());
        }
    }

    Some(Entity {
        kind: EntityKind::Class,
        name,
        lineno: node.start_position().row + 1,
        end_lineno: node.end_position().row + 1,
        docstring: body_docstring(node, source),
        methods: Some(methods),
        bases: Some(bases),
    })
}

/// Docstring of a definition: the leading string expression of its body.
fn body_docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    statement_string(body.named_child(0)?, source)
}

/// The string value of an expression statement, or `None` when the
/// statement is not a plain (possibly concatenated) string literal.
fn statement_string(statement: Node, source: &str) -> Option<String> {
    if statement.kind() != "expression_statement" {
        return None;
    }
    let expr = statement.named_child(0)?;
    match expr.kind() {
        "string" => Some(string_value(expr, source)),
        "concatenated_string" => {
            let mut value = String::new();
            let mut cursor = expr.walk();
            for part in expr.named_children(&mut cursor) {
                if part.kind() == "string" {
                    value.push_str(&string_value(part, source));
                }
            }
            Some(value)
        }
        _ => None,
    }
}

/// Content of a string literal without its quote delimiters.
fn string_value(node: Node, source: &str) -> String {
    let mut value = String::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "string_content" | "escape_sequence" => value.push_str(node_text(child, source)),
            _ => {}
        }
    }
    value
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// Decision-point weight of a node kind.
fn decision_weight(kind: &str) -> u32 {
    match kind {
        "if_statement"
        | "elif_clause"
        | "conditional_expression"
        | "for_statement"
        | "while_statement"
        | "except_clause"
        | "case_clause"
        | "assert_statement"
        | "if_clause"
        | "boolean_operator" => 1,
        _ => 0,
    }
}

/// One complexity entry per function definition anywhere in the tree, in
/// source order. Methods and nested functions measure independently.
fn compute_complexity(root: Node, source: &str) -> Result<Vec<ComplexityEntry>, ()> {
    let mut entries = Vec::new();
    collect_functions(root, source, 0, &mut entries)?;
    Ok(entries)
}

fn collect_functions(
    node: Node,
    source: &str,
    depth: usize,
    entries: &mut Vec<ComplexityEntry>,
) -> Result<(), ()> {
    if depth > MAX_TREE_DEPTH {
        return Err(());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "function_definition" {
            if let Some(name) = child.child_by_field_name("name") {
                let complexity = 1 + count_decisions(child, depth + 1)?;
                entries.push(ComplexityEntry {
                    function: node_text(name, source).to_string(),
                    complexity,
                    lineno: child.start_position().row + 1,
                });
            }
        }
        collect_functions(child, source, depth + 1, entries)?;
    }
    Ok(())
}

/// Count decision points within a function body without descending into
/// nested function or class definitions (those measure on their own).
fn count_decisions(node: Node, depth: usize) -> Result<u32, ()> {
    if depth > MAX_TREE_DEPTH {
        return Err(());
    }
    let mut count = 0;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "function_definition" | "class_definition") {
            continue;
        }
        count += decision_weight(child.kind());
        count += count_decisions(child, depth + 1)?;
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Raw metrics
// ---------------------------------------------------------------------------

/// Classify every line as multi-string, blank, comment, or source.
///
/// `multi` wins over the others so that blank or `#`-leading lines inside a
/// docstring are not miscounted; `sloc` is the remainder.
fn compute_raw_metrics(root: Node, source: &str) -> Result<RawMetrics, ()> {
    let loc = source.lines().count();
    if loc == 0 {
        return Ok(RawMetrics::default());
    }

    let mut multi_lines = vec![false; loc];
    mark_string_statements(root, 0, &mut multi_lines)?;

    let mut raw = RawMetrics {
        loc,
        ..RawMetrics::default()
    };
    for (index, line) in source.lines().enumerate() {
        if multi_lines[index] {
            raw.multi += 1;
        } else if line.trim().is_empty() {
            raw.blank += 1;
        } else if line.trim_start().starts_with('#') {
            raw.comments += 1;
        } else {
            raw.sloc += 1;
        }
    }
    Ok(raw)
}

/// Mark the line span of every string-only expression statement (module,
/// class, and function docstrings included).
fn mark_string_statements(node: Node, depth: usize, lines: &mut [bool]) -> Result<(), ()> {
    if depth > MAX_TREE_DEPTH {
        return Err(());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "expression_statement" {
            let is_string = child.named_child(0).is_some_and(|expr| {
                matches!(expr.kind(), "string" | "concatenated_string")
            });
            if is_string {
                let start = child.start_position().row;
                let end = child.end_position().row.min(lines.len().saturating_sub(1));
                for flag in &mut lines[start..=end] {
                    *flag = true;
                }
                continue;
            }
        }
        mark_string_statements(child, depth + 1, lines)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Import extraction and heuristic dependency-graph resolution.
//!
//! Pass 1 collects raw dotted module targets per file with compiled regex
//! line scanning. Pass 2 matches each target against every candidate path:
//! a target `t` resolves to path `p` when `t` is a substring of `p`, or
//! when `p` ends with `t` rewritten as a path plus `.py`. The heuristic is
//! intentionally approximate: it does not model packages, relative
//! imports, or namespace resolution, and both false positives (unrelated
//! path containing the substring) and false negatives (`__init__`
//! indirection) are accepted baseline behavior.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::index::DependencyEdge;

static PY_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+(\.*)([A-Za-z0-9_.]*)\s+import\s").unwrap());

static PY_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+?)\s*$").unwrap());

static MODULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap());

/// Collect the dotted module names a file references.
///
/// Both plain imports and from-imports count; only the module name is kept,
/// never the imported symbol names. Relative-import dots are stripped, and
/// a bare `from . import x` contributes nothing.
pub fn extract_imports(source: &str) -> Vec<String> {
    let mut imports = Vec::new();
    for line in source.lines() {
        if let Some(caps) = PY_FROM_RE.captures(line) {
            let module = caps[2].trim();
            if !module.is_empty() {
                imports.push(module.to_string());
            }
            continue;
        }
        if let Some(caps) = PY_IMPORT_RE.captures(line) {
            // "import a.b as c, d" contributes a.b and d
            for clause in caps[1].split(',') {
                let target = clause.trim().split_whitespace().next().unwrap_or("");
                if MODULE_NAME_RE.is_match(target) {
                    imports.push(target.to_string());
                }
            }
        }
    }
    imports
}

fn resolves_to(target: &str, path: &str) -> bool {
    path.contains(target) || path.ends_with(&format!("{}.py", target.replace('.', "/")))
}

/// Build the dependency map over the complete file set.
///
/// `files` pairs each relative path with its source text, in discovery
/// order. Every resolved match appends the importing file's path to the
/// imported file's `imported_by` list; duplicates from repeated import
/// statements are kept as parsed.
pub fn build_dependency_graph(files: &[(String, String)]) -> IndexMap<String, DependencyEdge> {
    let imports_map: Vec<(String, Vec<String>)> = files
        .iter()
        .map(|(path, source)| (path.clone(), extract_imports(source)))
        .collect();

    let mut dependencies: IndexMap<String, DependencyEdge> = imports_map
        .iter()
        .map(|(path, imports)| {
            (
                path.clone(),
                DependencyEdge {
                    imports: imports.clone(),
                    imported_by: Vec::new(),
                },
            )
        })
        .collect();

    let paths: Vec<String> = imports_map.iter().map(|(path, _)| path.clone()).collect();
    for (importer, imports) in &imports_map {
        for target in imports {
            for path in &paths {
                if resolves_to(target, path) {
                    if let Some(edge) = dependencies.get_mut(path) {
                        edge.imported_by.push(importer.clone());
                    }
                }
            }
        }
    }

    dependencies
}

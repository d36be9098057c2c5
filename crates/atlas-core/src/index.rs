//! Snapshot document model shared across scanning, persistence, and rule
//! evaluation.
//!
//! Field names are part of the on-disk contract consumed by downstream
//! tooling (rankers, agents) and must not change: the top-level document is
//! `{scanned_root, scanned_at, version, total_files, files, dependencies,
//! symbol_index}`.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::AtlasResult;

// ---------------------------------------------------------------------------
// Schema / contract constants
// ---------------------------------------------------------------------------

/// Schema version stamped into every generated index document.
pub const SCHEMA_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Kind of a top-level declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Class,
    Function,
    AsyncFunction,
}

/// A top-level class or function declaration extracted from a file.
///
/// Nested functions and methods are not independently indexed; classes carry
/// their one-level method-name list instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub lineno: usize,
    pub end_lineno: usize,
    pub docstring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bases: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Cyclomatic complexity of one function (decision points + 1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEntry {
    pub function: String,
    pub complexity: u32,
    pub lineno: usize,
}

/// Raw size metrics for one file. All fields are zero when analysis fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub loc: usize,
    pub sloc: usize,
    pub comments: usize,
    pub multi: usize,
    pub blank: usize,
}

// ---------------------------------------------------------------------------
// Collaborator blocks
// ---------------------------------------------------------------------------

/// Version-control metadata retrieved from the `git` collaborator.
///
/// Defaults on any failure; the block is opaque to the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMeta {
    pub commits: u32,
    pub last_author: String,
    pub last_commit: String,
}

/// Optional deep-analysis block: external type-check summary plus the
/// approximate, name-based intraprocedural call graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepAnalysis {
    pub type_coverage: f64,
    pub type_errors: u32,
    pub call_graph: IndexMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// The complete analysis record for a single source file.
///
/// `path` is relative to the scan root (forward-slash normalized) when the
/// file lives under it, absolute otherwise; it is never empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub entities: Vec<Entity>,
    pub complexity: Vec<ComplexityEntry>,
    pub raw: RawMetrics,
    pub comment_ratio: f64,
    pub git: GitMeta,
    pub has_tests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep: Option<DeepAnalysis>,
}

impl FileRecord {
    /// A record for a file that could not be analyzed at all: everything
    /// empty or zero, with the failure description carried in `error`.
    pub fn failed(path: String, error: String) -> Self {
        Self {
            path,
            entities: Vec::new(),
            complexity: Vec::new(),
            raw: RawMetrics::default(),
            comment_ratio: 0.0,
            git: GitMeta::default(),
            has_tests: false,
            error: Some(error),
            deep: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dependency edges
// ---------------------------------------------------------------------------

/// Directed import relationships for one file, resolved heuristically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub imports: Vec<String>,
    pub imported_by: Vec<String>,
}

// ---------------------------------------------------------------------------
// CodeIndex
// ---------------------------------------------------------------------------

/// The versioned snapshot produced by one scan: per-file records in
/// discovery order plus the globally rebuilt dependency map and symbol index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeIndex {
    pub scanned_root: String,
    pub scanned_at: u64,
    pub version: String,
    pub total_files: usize,
    pub files: Vec<FileRecord>,
    pub dependencies: IndexMap<String, DependencyEdge>,
    pub symbol_index: IndexMap<String, String>,
}

impl CodeIndex {
    /// Load a previously persisted index document.
    pub fn load(path: &Path) -> AtlasResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Persist the index document as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> AtlasResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Look up a file record by its relative path.
    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.path == path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Source tree walking for the scan pipeline.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directory names pruned from every walk. Matches are by name at any depth.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".venv",
    "venv",
    "__pycache__",
    ".git",
    "node_modules",
    ".pytest_cache",
    ".mypy_cache",
];

fn is_ignored_dir(name: &str, ignored: &[&str]) -> bool {
    ignored.contains(&name)
}

/// Enumerate Python files under `root`, pruning ignored directory names.
///
/// Entries are yielded in a stable, sorted order so that discovery order
/// (and therefore symbol-index collision resolution) is deterministic for a
/// given tree.
pub fn walk_python_files(root: &Path, ignored: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // The root itself is never pruned, whatever it is named.
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !is_ignored_dir(&name, ignored)
        });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "py") {
            files.push(path.to_path_buf());
        }
    }
    files
}

/// Relative forward-slash path of `path` under `root`, or the absolute
/// forward-slash path when the file lies outside the root.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

//! Scan pipeline orchestration.
//!
//! Per-file extraction is pure and fans out over a Rayon pool; the change
//! cache stays with this single writer and persists once at the end of the
//! run. Dependency resolution and symbol indexing are barriers: they only
//! run once every file has been extracted or reused. The entry points are
//! safely re-entrant: every call produces a complete, self-consistent
//! index for the same root.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;

use crate::errors::AtlasResult;
use crate::index::{CodeIndex, FileRecord, GitMeta, SCHEMA_VERSION};
use crate::indexer::cache::ChangeCache;
use crate::indexer::walker::{relative_path, walk_python_files, DEFAULT_IGNORED_DIRS};
use crate::indexer::{deep, deps, extractor, git_meta, symbols};

// ---------------------------------------------------------------------------
// Options & stats
// ---------------------------------------------------------------------------

/// Behavior switches for one scan run.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Reuse prior records for files whose fingerprint is unchanged.
    pub incremental: bool,
    /// Attach the deep-analysis block to every record.
    pub deep: bool,
    /// Collect version-control metadata per file.
    pub git: bool,
    /// External type checker binary used by deep analysis.
    pub type_checker: String,
    /// Directory names pruned from the walk.
    pub ignored_dirs: Vec<String>,
    /// Extraction worker threads; 0 uses the global Rayon pool.
    pub workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            incremental: false,
            deep: false,
            git: true,
            type_checker: deep::DEFAULT_TYPE_CHECKER.to_string(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
            workers: 0,
        }
    }
}

/// Summary counters from one scan run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_seen: usize,
    pub scanned: usize,
    pub reused: usize,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Scans a source tree into a [`CodeIndex`] snapshot.
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, ScanOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the tree, reusing records from `previous` for unchanged files
    /// when incremental mode is on.
    pub fn scan(&self, previous: Option<&CodeIndex>) -> AtlasResult<(CodeIndex, ScanStats)> {
        let started = Instant::now();
        let ignored: Vec<&str> = self.options.ignored_dirs.iter().map(String::as_str).collect();
        let paths = walk_python_files(&self.root, &ignored);

        let mut cache = self
            .options
            .incremental
            .then(|| ChangeCache::load(&self.root));
        let previous_files: HashMap<&str, &FileRecord> = previous
            .map(|index| {
                index
                    .files
                    .iter()
                    .map(|f| (f.path.as_str(), f))
                    .collect()
            })
            .unwrap_or_default();

        // Partition into reused records and extraction jobs, keeping the
        // discovery-order slot of every file.
        let mut records: Vec<Option<FileRecord>> = vec![None; paths.len()];
        let mut fingerprints: Vec<(String, String)> = Vec::new();
        let mut jobs: Vec<(usize, PathBuf, String)> = Vec::new();
        let mut reused = 0usize;

        for (slot, path) in paths.iter().enumerate() {
            let rel = relative_path(&self.root, path);
            let fingerprint = cache.as_ref().and_then(|_| ChangeCache::fingerprint(path));
            if let Some(fp) = &fingerprint {
                fingerprints.push((rel.clone(), fp.clone()));
            }

            let unchanged = match (&cache, &fingerprint) {
                (Some(cache), Some(fp)) => cache.is_unchanged(&rel, fp),
                _ => false,
            };
            if unchanged {
                // The fingerprint matched, but the record must also exist in
                // the prior index; otherwise fall back to re-extraction so
                // no file is dropped.
                if let Some(prior) = previous_files.get(rel.as_str()) {
                    records[slot] = Some((*prior).clone());
                    reused += 1;
                    continue;
                }
            }
            jobs.push((slot, path.clone(), rel));
        }

        let scanned = jobs.len();
        let fresh: Vec<(usize, FileRecord)> = if self.options.workers > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.workers)
                .build()
            {
                Ok(pool) => pool.install(|| self.extract_jobs(&jobs)),
                Err(_) => self.extract_jobs(&jobs),
            }
        } else {
            self.extract_jobs(&jobs)
        };
        for (slot, record) in fresh {
            records[slot] = Some(record);
        }

        let files: Vec<FileRecord> = records.into_iter().flatten().collect();

        if let Some(cache) = cache.as_mut() {
            for (rel, fp) in fingerprints {
                cache.update(&rel, fp);
            }
            let valid: HashSet<String> = files.iter().map(|f| f.path.clone()).collect();
            cache.retain_paths(&valid);
            if let Err(error) = cache.save() {
                tracing::warn!(%error, "failed to persist change cache");
            }
        }

        // Global passes over the complete set.
        let sources: Vec<(String, String)> = files
            .iter()
            .map(|f| {
                let text = std::fs::read_to_string(self.root.join(&f.path)).unwrap_or_default();
                (f.path.clone(), text)
            })
            .collect();
        let dependencies = deps::build_dependency_graph(&sources);
        let symbol_index = symbols::build_symbol_index(&files);

        let stats = ScanStats {
            files_seen: paths.len(),
            scanned,
            reused,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            files = stats.files_seen,
            scanned = stats.scanned,
            reused = stats.reused,
            elapsed_ms = stats.elapsed_ms,
            "scan complete"
        );

        let index = CodeIndex {
            scanned_root: self.root.to_string_lossy().replace('\\', "/"),
            scanned_at: now_unix(),
            version: SCHEMA_VERSION.to_string(),
            total_files: files.len(),
            files,
            dependencies,
            symbol_index,
        };
        Ok((index, stats))
    }

    /// Scan and persist the snapshot at `output`. In incremental mode the
    /// prior index is loaded from the same path; a missing or corrupt prior
    /// document simply means nothing can be reused.
    pub fn scan_to_file(&self, output: &Path) -> AtlasResult<ScanStats> {
        let previous = if self.options.incremental {
            CodeIndex::load(output).ok()
        } else {
            None
        };
        let (index, stats) = self.scan(previous.as_ref())?;
        index.save(output)?;
        Ok(stats)
    }

    fn extract_jobs(&self, jobs: &[(usize, PathBuf, String)]) -> Vec<(usize, FileRecord)> {
        jobs.par_iter()
            .map(|(slot, path, rel)| (*slot, self.scan_file(path, rel)))
            .collect()
    }

    /// Analyze a single file. Never fails: unreadable or malformed input
    /// produces a record with `error` set and everything else defaulted.
    fn scan_file(&self, path: &Path, rel: &str) -> FileRecord {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                let mut record = FileRecord::failed(rel.to_string(), error.to_string());
                if self.options.deep {
                    record.deep = Some(deep::analyze(path, "", &self.options.type_checker));
                }
                return record;
            }
        };

        let extraction = extractor::extract(&source);
        let mut record = match extraction.error {
            Some(error) => FileRecord::failed(rel.to_string(), error),
            None => FileRecord {
                path: rel.to_string(),
                entities: extraction.entities,
                complexity: extraction.complexity,
                raw: extraction.raw,
                comment_ratio: extraction.comment_ratio,
                git: if self.options.git {
                    git_meta::collect(&self.root, Path::new(rel))
                } else {
                    GitMeta::default()
                },
                has_tests: has_test_file(&self.root, rel),
                error: None,
                deep: None,
            },
        };

        if self.options.deep {
            record.deep = Some(deep::analyze(path, &source, &self.options.type_checker));
        }
        record
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fixed naming convention for companion tests: `src/<name>.py` pairs with
/// `tests/test_<name>.py`. Paths outside a `src/` segment have no derivable
/// candidate and report no tests; an unreadable candidate is "no tests",
/// never an error.
fn has_test_file(root: &Path, rel: &str) -> bool {
    let full = root.join(rel).to_string_lossy().replace('\\', "/");
    let candidate = full.replace("src/", "tests/test_");
    if candidate == full {
        return false;
    }
    Path::new(&candidate).exists()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn quiet_options() -> ScanOptions {
        ScanOptions {
            git: false,
            ..ScanOptions::default()
        }
    }

    fn scan(root: &Path, options: ScanOptions) -> (CodeIndex, ScanStats) {
        Scanner::with_options(root, options).scan(None).unwrap()
    }

    #[test]
    fn test_full_scan_assembles_index() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.py", "from pkg.mod import helper\n\nx = 1\n");
        write(
            dir.path(),
            "pkg/mod.py",
            "def helper():\n    return 1\n",
        );

        let (index, stats) = scan(dir.path(), quiet_options());
        assert_eq!(index.version, SCHEMA_VERSION);
        assert_eq!(index.total_files, 2);
        assert_eq!(index.files.len(), 2);
        assert_eq!(stats.files_seen, 2);
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.reused, 0);

        // discovery order: sorted walk
        assert_eq!(index.files[0].path, "app.py");
        assert_eq!(index.files[1].path, "pkg/mod.py");

        // dependency heuristic: pkg.mod resolves to pkg/mod.py
        assert_eq!(
            index.dependencies["pkg/mod.py"].imported_by,
            vec!["app.py"]
        );
        assert_eq!(index.symbol_index["helper"], "pkg/mod.py:1");
    }

    #[test]
    fn test_malformed_file_does_not_abort_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.py", "def broken(:\n    pass\n");
        write(dir.path(), "good.py", "def fine():\n    return 1\n");

        let (index, _) = scan(dir.path(), quiet_options());
        assert_eq!(index.total_files, 2);

        let bad = index.file("bad.py").unwrap();
        assert!(bad.error.as_deref().unwrap().starts_with("SyntaxError:"));
        assert!(bad.entities.is_empty());
        assert_eq!(bad.comment_ratio, 0.0);

        let good = index.file("good.py").unwrap();
        assert!(good.error.is_none());
        assert_eq!(good.entities.len(), 1);
    }

    #[test]
    fn test_incremental_reuses_unchanged_records() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stable.py", "def stay():\n    return 1\n");

        let options = ScanOptions {
            incremental: true,
            ..quiet_options()
        };
        let output = dir.path().join("code_index.json");

        let scanner = Scanner::with_options(dir.path(), options);
        let first_stats = scanner.scan_to_file(&output).unwrap();
        assert_eq!(first_stats.scanned, 1);
        assert_eq!(first_stats.reused, 0);
        let first = CodeIndex::load(&output).unwrap();

        let second_stats = scanner.scan_to_file(&output).unwrap();
        assert_eq!(second_stats.scanned, 0);
        assert_eq!(second_stats.reused, 1);
        let second = CodeIndex::load(&output).unwrap();

        assert_eq!(first.files, second.files);
    }

    #[test]
    fn test_incremental_rescans_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "churn.py", "def v1():\n    return 1\n");

        let options = ScanOptions {
            incremental: true,
            ..quiet_options()
        };
        let output = dir.path().join("code_index.json");
        let scanner = Scanner::with_options(dir.path(), options);
        scanner.scan_to_file(&output).unwrap();

        write(dir.path(), "churn.py", "def v2():\n    return 2\n");
        let stats = scanner.scan_to_file(&output).unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.reused, 0);

        let index = CodeIndex::load(&output).unwrap();
        assert_eq!(index.file("churn.py").unwrap().entities[0].name, "v2");
    }

    #[test]
    fn test_incremental_without_prior_index_scans_everything() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1\n");

        let options = ScanOptions {
            incremental: true,
            ..quiet_options()
        };
        let (_, stats) = scan(dir.path(), options);
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.reused, 0);

        // fingerprints were still recorded for the next run
        let cache = ChangeCache::load(dir.path());
        let fp = ChangeCache::fingerprint(&dir.path().join("a.py")).unwrap();
        assert!(cache.is_unchanged("a.py", &fp));
    }

    #[test]
    fn test_unchanged_fingerprint_missing_from_prior_index_rescans() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1\n");

        let options = ScanOptions {
            incremental: true,
            ..quiet_options()
        };
        // Seed the cache without any prior index.
        let scanner = Scanner::with_options(dir.path(), options);
        scanner.scan(None).unwrap();

        // Fingerprint matches, but the prior index has no such record.
        let empty_prior = CodeIndex {
            scanned_root: String::new(),
            scanned_at: 0,
            version: SCHEMA_VERSION.to_string(),
            total_files: 0,
            files: Vec::new(),
            dependencies: Default::default(),
            symbol_index: Default::default(),
        };
        let (index, stats) = scanner.scan(Some(&empty_prior)).unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.reused, 0);
        assert_eq!(index.total_files, 1);
    }

    #[test]
    fn test_cache_prunes_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.py", "x = 1\n");
        write(dir.path(), "gone.py", "y = 2\n");

        let options = ScanOptions {
            incremental: true,
            ..quiet_options()
        };
        let scanner = Scanner::with_options(dir.path(), options);
        scanner.scan(None).unwrap();

        std::fs::remove_file(dir.path().join("gone.py")).unwrap();
        scanner.scan(None).unwrap();

        let cache = ChangeCache::load(dir.path());
        let keep_fp = ChangeCache::fingerprint(&dir.path().join("keep.py")).unwrap();
        assert!(cache.is_unchanged("keep.py", &keep_fp));
        assert!(!cache.is_unchanged("gone.py", "anything"));
    }

    #[test]
    fn test_symbol_collision_last_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def foo():\n    return 1\n");
        write(dir.path(), "b.py", "def foo():\n    return 2\n");

        let (index, _) = scan(dir.path(), quiet_options());
        // sorted walk: a.py then b.py; last writer wins
        assert_eq!(index.symbol_index["foo"], "b.py:1");
    }

    #[test]
    fn test_has_tests_convention() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/feature.py", "def f():\n    return 1\n");
        write(dir.path(), "src/lonely.py", "def g():\n    return 2\n");
        write(dir.path(), "tests/test_feature.py", "def test_f():\n    pass\n");

        let (index, _) = scan(dir.path(), quiet_options());
        assert!(index.file("src/feature.py").unwrap().has_tests);
        assert!(!index.file("src/lonely.py").unwrap().has_tests);
        // no src/ segment, no derivable candidate
        assert!(!index.file("tests/test_feature.py").unwrap().has_tests);
    }

    #[test]
    fn test_deep_scan_attaches_block() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m.py", "def top():\n    helper()\n");

        let options = ScanOptions {
            deep: true,
            type_checker: "definitely-not-a-type-checker".to_string(),
            ..quiet_options()
        };
        let (index, _) = scan(dir.path(), options);
        let deep = index.file("m.py").unwrap().deep.as_ref().unwrap();
        assert_eq!(deep.type_errors, 0);
        assert_eq!(deep.call_graph["top"], vec!["helper"]);
    }

    #[test]
    fn test_rescan_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    return 1\n");

        let scanner = Scanner::with_options(dir.path(), quiet_options());
        let (first, _) = scanner.scan(None).unwrap();
        let (second, _) = scanner.scan(None).unwrap();
        assert_eq!(first.files, second.files);
        assert_eq!(first.dependencies, second.dependencies);
        assert_eq!(first.symbol_index, second.symbol_index);
        assert_eq!(second.total_files, second.files.len());
    }

    #[test]
    fn test_worker_pool_option() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            write(
                dir.path(),
                &format!("m{i}.py"),
                &format!("def f{i}():\n    return {i}\n"),
            );
        }
        let options = ScanOptions {
            workers: 2,
            ..quiet_options()
        };
        let (index, stats) = scan(dir.path(), options);
        assert_eq!(index.total_files, 8);
        assert_eq!(stats.scanned, 8);
    }
}

//! Persistent per-file fingerprint store for incremental scans.
//!
//! The store is a path-keyed map of SHA-256 content digests, persisted as
//! JSON under the scan root. It is owned by a single writer for the
//! duration of one scan run and persisted once at the end. An absent or
//! corrupt store loads as empty: a cold start, never an error.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::AtlasResult;

const CACHE_VERSION: u32 = 1;

/// File name of the persisted store, relative to the scan root.
pub const CACHE_FILE_NAME: &str = ".atlas_cache.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    files: HashMap<String, String>,
}

/// Change cache gating re-extraction during incremental scans.
#[derive(Debug)]
pub struct ChangeCache {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl ChangeCache {
    /// Load the store for `root`, treating a missing, unreadable, or
    /// version-mismatched file as empty.
    pub fn load(root: &Path) -> Self {
        let path = root.join(CACHE_FILE_NAME);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<CacheDocument>(&text).ok())
            .filter(|doc| doc.version == CACHE_VERSION)
            .map(|doc| doc.files)
            .unwrap_or_default();
        if entries.is_empty() {
            tracing::debug!(path = %path.display(), "change cache cold start");
        }
        Self { path, entries }
    }

    /// SHA-256 hex digest of the file's current content, or `None` when the
    /// file cannot be read.
    pub fn fingerprint(path: &Path) -> Option<String> {
        let data = std::fs::read(path).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&data);
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Whether the stored fingerprint for `rel_path` equals `fingerprint`.
    pub fn is_unchanged(&self, rel_path: &str, fingerprint: &str) -> bool {
        self.entries.get(rel_path).map(String::as_str) == Some(fingerprint)
    }

    /// Record the current fingerprint for `rel_path`.
    pub fn update(&mut self, rel_path: &str, fingerprint: String) {
        self.entries.insert(rel_path.to_string(), fingerprint);
    }

    /// Prune entries whose path is no longer present under the root.
    pub fn retain_paths(&mut self, valid: &HashSet<String>) {
        self.entries.retain(|path, _| valid.contains(path));
    }

    /// Persist the store. Called once at the end of a scan run so an
    /// interrupted run never leaves a partially written map behind.
    pub fn save(&self) -> AtlasResult<()> {
        let doc = CacheDocument {
            version: CACHE_VERSION,
            files: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_store_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChangeCache::load(dir.path());
        assert_eq!(cache.len(), 0);
        assert!(!cache.is_unchanged("a.py", "deadbeef"));
    }

    #[test]
    fn test_corrupt_store_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CACHE_FILE_NAME), "{nope").unwrap();
        let cache = ChangeCache::load(dir.path());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let first = ChangeCache::fingerprint(&file).unwrap();
        let again = ChangeCache::fingerprint(&file).unwrap();
        assert_eq!(first, again);

        std::fs::write(&file, "x = 2\n").unwrap();
        let changed = ChangeCache::fingerprint(&file).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn test_fingerprint_unreadable_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ChangeCache::fingerprint(&dir.path().join("absent.py")).is_none());
    }

    #[test]
    fn test_round_trip_and_unchanged_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();
        let fp = ChangeCache::fingerprint(&file).unwrap();

        let mut cache = ChangeCache::load(dir.path());
        assert!(!cache.is_unchanged("a.py", &fp));
        cache.update("a.py", fp.clone());
        cache.save().unwrap();

        let reloaded = ChangeCache::load(dir.path());
        assert!(reloaded.is_unchanged("a.py", &fp));
        assert!(!reloaded.is_unchanged("a.py", "other"));
        assert!(!reloaded.is_unchanged("b.py", &fp));
    }

    #[test]
    fn test_retain_prunes_vanished_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChangeCache::load(dir.path());
        cache.update("keep.py", "aaa".to_string());
        cache.update("gone.py", "bbb".to_string());

        let valid: HashSet<String> = ["keep.py".to_string()].into_iter().collect();
        cache.retain_paths(&valid);
        cache.save().unwrap();

        let reloaded = ChangeCache::load(dir.path());
        assert!(reloaded.is_unchanged("keep.py", "aaa"));
        assert_eq!(reloaded.len(), 1);
    }
}

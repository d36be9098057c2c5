//! Version-control metadata collaborator.
//!
//! Three bounded `git` invocations per file: commit count, last author,
//! last commit date. Any failure (no repository, missing binary, timeout,
//! non-zero exit) degrades to the default block.

use std::path::Path;
use std::time::Duration;

use crate::index::GitMeta;
use crate::indexer::external::run_with_timeout;

/// Deadline for each individual git invocation.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(5);

fn git_stdout(root: &Path, args: &[&str]) -> Option<String> {
    let output = run_with_timeout("git", args, Some(root), GIT_TIMEOUT)?;
    if output.success {
        Some(output.stdout.trim().to_string())
    } else {
        None
    }
}

/// Collect commit count, last author, and last commit date for one file.
pub fn collect(root: &Path, path: &Path) -> GitMeta {
    let path_arg = path.to_string_lossy();

    let commits = git_stdout(root, &["rev-list", "--count", "HEAD", "--", &path_arg])
        .and_then(|out| out.parse::<u32>().ok())
        .unwrap_or(0);

    let last_author =
        git_stdout(root, &["log", "-1", "--pretty=%an", "--", &path_arg]).unwrap_or_default();

    let last_commit = git_stdout(
        root,
        &["log", "-1", "--pretty=%ad", "--date=short", "--", &path_arg],
    )
    .unwrap_or_default();

    GitMeta {
        commits,
        last_author,
        last_commit,
    }
}

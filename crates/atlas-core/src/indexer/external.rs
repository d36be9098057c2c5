//! Bounded invocation of external collaborator processes.
//!
//! Every external call the pipeline makes (version-control metadata, the
//! optional type checker) goes through [`run_with_timeout`]: the child is
//! killed at the deadline and the caller degrades to its default result.
//! No failure here ever propagates into the scan.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished external command.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub success: bool,
}

/// Run `program` with `args`, killing it after `timeout`.
///
/// Returns `None` when the program cannot be spawned or the deadline
/// passes; stdout is drained on a separate thread so a chatty child cannot
/// deadlock the pipe.
pub(crate) fn run_with_timeout(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Option<CommandOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().ok()?;
    let stdout = child.stdout.take();
    let (sender, receiver) = mpsc::channel();
    let reader = std::thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_string(&mut buffer);
        }
        let _ = sender.send(buffer);
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = receiver
                    .recv_timeout(Duration::from_secs(1))
                    .unwrap_or_default();
                let _ = reader.join();
                return Some(CommandOutput {
                    stdout,
                    success: status.success(),
                });
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    tracing::debug!(program, "external command timed out");
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = reader.join();
                    return None;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(_) => {
                let _ = child.kill();
                let _ = reader.join();
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_of_quick_command() {
        let output = run_with_timeout("echo", &["hello"], None, Duration::from_secs(5))
            .expect("echo should run");
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_nonexistent_program_is_none() {
        let output = run_with_timeout(
            "definitely-not-a-real-binary-name",
            &[],
            None,
            Duration::from_secs(1),
        );
        assert!(output.is_none());
    }

    #[test]
    fn test_nonzero_exit_reports_failure() {
        let output = run_with_timeout("false", &[], None, Duration::from_secs(5))
            .expect("false should run");
        assert!(!output.success);
    }

    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let output = run_with_timeout("sleep", &["30"], None, Duration::from_millis(200));
        assert!(output.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

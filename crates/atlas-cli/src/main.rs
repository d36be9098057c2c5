//! CodeAtlas command-line interface: `scan` builds the index snapshot,
//! `check` evaluates rules against a previously generated snapshot.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use atlas_core::{CodeIndex, RuleEngine, ScanOptions, Scanner};

#[derive(Parser)]
#[command(
    name = "code-atlas",
    version,
    about = "Agent-oriented Python codebase analyzer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a Python codebase and generate a structure index
    Scan {
        /// Path to scan
        path: PathBuf,
        /// Output file path
        #[arg(long, default_value = "code_index.json")]
        output: PathBuf,
        /// Use incremental caching (skip unchanged files)
        #[arg(long)]
        incremental: bool,
        /// Enable deep analysis (call graphs, type coverage)
        #[arg(long)]
        deep: bool,
    },
    /// Check code against quality rules
    Check {
        /// Rules configuration file
        #[arg(long, default_value = "rules.toml")]
        rules: PathBuf,
        /// Code index file
        #[arg(long, default_value = "code_index.json")]
        index_file: PathBuf,
        /// Output file
        #[arg(long, default_value = "violations.json")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Scan {
            path,
            output,
            incremental,
            deep,
        } => run_scan(&path, &output, incremental, deep),
        Command::Check {
            rules,
            index_file,
            output,
        } => run_check(&rules, &index_file, &output),
    }
}

fn run_scan(path: &PathBuf, output: &PathBuf, incremental: bool, deep: bool) -> anyhow::Result<()> {
    println!("Scanning {}...", path.display());
    if incremental {
        println!("Incremental mode: skipping unchanged files");
    }
    if deep {
        println!("Deep analysis: including call graphs and type coverage");
    }

    let options = ScanOptions {
        incremental,
        deep,
        ..ScanOptions::default()
    };
    let stats = Scanner::with_options(path, options)
        .scan_to_file(output)
        .with_context(|| format!("scan of {} failed", path.display()))?;

    println!(
        "Scanned {} files ({} reused) in {} ms",
        stats.files_seen, stats.reused, stats.elapsed_ms
    );
    println!("Index written to {}", output.display());
    Ok(())
}

fn run_check(rules: &PathBuf, index_file: &PathBuf, output: &PathBuf) -> anyhow::Result<()> {
    let index = CodeIndex::load(index_file)
        .with_context(|| format!("cannot load index {}", index_file.display()))?;
    let engine = RuleEngine::load(rules)?;

    let violations = engine.evaluate_all(&index.files);
    std::fs::write(output, serde_json::to_string_pretty(&violations)?)?;

    println!("\nFound {} rule violations", violations.len());
    if !violations.is_empty() {
        println!("\nSample violations:");
        for violation in violations.iter().take(5) {
            println!(
                "  [{}] {}: {}",
                violation.id, violation.file, violation.message
            );
        }
    }
    println!("\nAll violations written to {}", output.display());
    Ok(())
}

//! CodeAtlas core library — structural scanning, metrics, and rule
//! evaluation for Python source trees.
//!
//! One scan walks a root, extracts entities and complexity/size metrics per
//! file (reusing prior records for unchanged files in incremental mode),
//! resolves a heuristic import graph and a flat symbol index over the
//! complete set, and assembles everything into a versioned JSON snapshot.
//! The rule engine runs downstream over a loaded snapshot and a declarative
//! rule configuration, producing violations for consumers such as rankers,
//! agents, and CLIs.

pub mod errors;
pub mod index;
pub mod indexer;
pub mod rules;
pub mod watch;

pub use errors::{AtlasError, AtlasResult};
pub use index::{CodeIndex, DependencyEdge, Entity, EntityKind, FileRecord, SCHEMA_VERSION};
pub use indexer::scanner::{ScanOptions, ScanStats, Scanner};
pub use rules::{RuleConfig, RuleEngine, Violation};

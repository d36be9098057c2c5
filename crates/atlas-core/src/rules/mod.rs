//! Declarative rule evaluation over scanned file records.
//!
//! A rule configuration carries a `metrics` block of named numeric
//! thresholds and an ordered `actions` list. For each file the engine binds
//! a fixed variable set (`complexity` as the mean of the file's
//! measurements, `loc`, `comment_ratio`, and every threshold by name), then
//! evaluates
//! each condition through the sandboxed expression evaluator. A condition
//! that fails to evaluate simply does not trigger; only a missing or
//! unparsable configuration file is fatal.

pub mod expr;

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{AtlasError, AtlasResult};
use crate::index::FileRecord;
use crate::rules::expr::Value;

// ---------------------------------------------------------------------------
// Threshold defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_COMPLEXITY: f64 = 10.0;
pub const DEFAULT_MAX_LOC: f64 = 500.0;
pub const DEFAULT_MIN_COMMENT_RATIO: f64 = 0.1;

// ---------------------------------------------------------------------------
// Configuration model
// ---------------------------------------------------------------------------

/// One declarative rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "default_rule_id")]
    pub id: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub action: String,
}

fn default_rule_id() -> String {
    "UNKNOWN".to_string()
}

/// Rule configuration document: named thresholds plus ordered rules.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub metrics: IndexMap<String, f64>,
    #[serde(default)]
    pub actions: Vec<Rule>,
}

/// One triggered rule instance against one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub message: String,
    pub action: String,
    pub file: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Evaluates a loaded rule set against file records.
#[derive(Debug)]
pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    /// Load a rule configuration from a TOML or JSON file.
    ///
    /// This is the only fatal error path in the crate: a missing or
    /// unparsable configuration aborts the operation.
    pub fn load(path: &Path) -> AtlasResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AtlasError::Config(format!("cannot read rules file {}: {e}", path.display()))
        })?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&text).map_err(|e| {
                AtlasError::Config(format!("invalid rules file {}: {e}", path.display()))
            })?
        } else {
            toml::from_str(&text).map_err(|e| {
                AtlasError::Config(format!("invalid rules file {}: {e}", path.display()))
            })?
        };
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Evaluate every rule against one file, preserving declaration order.
    pub fn evaluate(&self, file: &FileRecord) -> Vec<Violation> {
        let bindings = self.bindings(file);
        let mut violations = Vec::new();
        for rule in &self.config.actions {
            match expr::evaluate_bool(&rule.condition, &bindings) {
                Ok(true) => violations.push(Violation {
                    id: rule.id.clone(),
                    message: rule.message.clone(),
                    action: rule.action.clone(),
                    file: file.path.clone(),
                }),
                Ok(false) => {}
                Err(error) => {
                    tracing::debug!(rule = %rule.id, %error, "condition not evaluable");
                }
            }
        }
        violations
    }

    /// Evaluate the rule set over a set of files.
    pub fn evaluate_all<'a>(
        &self,
        files: impl IntoIterator<Item = &'a FileRecord>,
    ) -> Vec<Violation> {
        files
            .into_iter()
            .flat_map(|file| self.evaluate(file))
            .collect()
    }

    /// The fixed variable binding for one file: computed metrics plus
    /// configured thresholds (with fallback constants for the three
    /// standard names).
    fn bindings(&self, file: &FileRecord) -> HashMap<String, Value> {
        let mut vars = HashMap::new();
        vars.insert(
            "complexity".to_string(),
            Value::Number(mean_complexity(file)),
        );
        vars.insert("loc".to_string(), Value::Number(file.raw.loc as f64));
        vars.insert(
            "comment_ratio".to_string(),
            Value::Number(file.comment_ratio),
        );
        vars.insert(
            "max_complexity".to_string(),
            Value::Number(DEFAULT_MAX_COMPLEXITY),
        );
        vars.insert("max_loc".to_string(), Value::Number(DEFAULT_MAX_LOC));
        vars.insert(
            "min_comment_ratio".to_string(),
            Value::Number(DEFAULT_MIN_COMMENT_RATIO),
        );
        for (name, value) in &self.config.metrics {
            vars.insert(name.clone(), Value::Number(*value));
        }
        vars
    }
}

/// Arithmetic mean of a file's complexity measurements, 0.0 when there are
/// none.
pub fn mean_complexity(file: &FileRecord) -> f64 {
    if file.complexity.is_empty() {
        return 0.0;
    }
    let total: u64 = file.complexity.iter().map(|c| u64::from(c.complexity)).sum();
    total as f64 / file.complexity.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

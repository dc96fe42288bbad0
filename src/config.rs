use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where in the host's statement pipeline the statistics pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptionPoint {
    /// Right after parse-analysis, once per statement (utility statements included).
    PostParseAnalyze,
    /// When the executor starts; utility statements never get here.
    ExecutorStart,
}

impl fmt::Display for InterceptionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptionPoint::PostParseAnalyze => write!(f, "post_parse_analyze"),
            InterceptionPoint::ExecutorStart => write!(f, "executor_start"),
        }
    }
}

impl std::str::FromStr for InterceptionPoint {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "post_parse_analyze" => Ok(InterceptionPoint::PostParseAnalyze),
            "executor_start" => Ok(InterceptionPoint::ExecutorStart),
            _ => Err(format!("Invalid interception point: {s}")),
        }
    }
}

/// What the hook does with a failed analysis pass once the statement has been forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure to the host as an error.
    Abort,
    /// Log the failure and let the statement succeed.
    Warn,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Warn => write!(f, "warn"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "warn" => Ok(FailurePolicy::Warn),
            _ => Err(format!("Invalid failure policy: {s}")),
        }
    }
}

/// Runtime settings for the statistics hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Pipeline stage the pass runs at.
    pub interception_point: InterceptionPoint,
    /// Handling of fatal analysis errors.
    pub failure_policy: FailurePolicy,
    /// Schemas whose relations are never analyzed.
    pub excluded_schemas: Vec<String>,
    /// Log authorization denials at `info` instead of `debug`.
    pub report_denials: bool,
    /// Ask the catalog for verbose maintenance output.
    pub verbose_analyze: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interception_point: InterceptionPoint::PostParseAnalyze,
            failure_policy: FailurePolicy::Abort,
            excluded_schemas: vec![
                "pg_catalog".to_string(),
                "information_schema".to_string(),
                "pg_toast".to_string(),
            ],
            report_denials: false,
            verbose_analyze: false,
        }
    }
}

impl Config {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Returns `true` when relations in `schema` must not be analyzed.
    pub fn is_excluded_schema(&self, schema: &str) -> bool {
        self.excluded_schemas.iter().any(|excluded| excluded == schema)
    }
}

//! Just-in-time planner statistics: find every relation a query reads and
//! analyze the ones that have never been analyzed, before the query runs.
#![warn(missing_docs)]

/// Relation metadata access: the catalog contract and its implementations.
pub mod catalog;
/// Runtime configuration loaded from JSON.
pub mod config;
/// Error types for catalog access, parse-analysis, analysis passes and configuration.
pub mod error;
/// File output and markdown report generation.
pub mod output;
/// SQL parsing and parse-analysis into query trees.
pub mod parser;
/// Relation discovery, view expansion and the statistics pass itself.
pub mod stats;

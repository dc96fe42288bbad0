use thiserror::Error;

use crate::catalog::{RelationId, RelationKind};

/// Failures reported by a [`RelationCatalog`](crate::catalog::RelationCatalog) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No relation carries the requested id.
    #[error("relation {0} not found in catalog")]
    NotFound(RelationId),
    /// More than one catalog row matched a relation id.
    #[error("{count} catalog rows found for relation {id}")]
    Ambiguous {
        /// The id that matched more than once.
        id: RelationId,
        /// Number of rows returned.
        count: usize,
    },
    /// The backing store itself failed (connection, SQL error, ...).
    #[error("catalog backend error: {0}")]
    Backend(String),
}

/// Failures while turning a parsed statement into a query tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyzeError {
    /// A relation named in the statement does not exist.
    #[error("relation \"{0}\" does not exist")]
    UnknownRelation(String),
    /// Name resolution hit a catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Fatal outcome of one statistics analysis pass.
///
/// Authorization denials and already-visited views are handled inside the
/// pass and never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// A relation id could not be resolved to exactly one record.
    #[error("catalog inconsistency for relation {id}: {source}")]
    CatalogInconsistency {
        /// Offending relation id.
        id: RelationId,
        /// Underlying catalog failure.
        #[source]
        source: CatalogError,
    },
    /// A relation of a kind the pass cannot reason about was reached.
    #[error("relation {name} ({id}) has unexpected kind {kind}")]
    UnexpectedKind {
        /// Offending relation id.
        id: RelationId,
        /// Qualified relation name.
        name: String,
        /// The kind that was found.
        kind: RelationKind,
    },
    /// Statistics collection failed for a relation.
    #[error("cannot run analyze for {relation}: {reason}")]
    Maintenance {
        /// Qualified relation name passed to the maintenance action.
        relation: String,
        /// Backend-reported reason.
        reason: String,
    },
}

/// Failures loading a [`Config`](crate::config::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`Config`](crate::config::Config).
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a host query handler or by the statistics hook.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host's own processing of the statement failed.
    #[error("query execution failed: {0}")]
    Execution(String),
    /// The statistics pass failed and the failure policy surfaces it.
    #[error(transparent)]
    Statistics(#[from] StatsError),
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::parser::names::quote_identifier;

/// In-memory catalog used by tests and by the CLI's `--schema` mode.
pub mod memory;
/// Live `PostgreSQL` catalog backed by `diesel`.
#[cfg(feature = "db")]
pub mod postgres;

/// Opaque catalog handle for a relation (a `pg_class` oid in `PostgreSQL`).
///
/// Id `0` is the synthetic placeholder: it never names a real relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(pub u32);

impl RelationId {
    /// The placeholder id carried by range-table entries that name no relation.
    pub const INVALID: RelationId = RelationId(0);

    /// Returns `true` for the placeholder id.
    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a catalogued relation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Ordinary storage-backed table.
    BaseTable,
    /// Partition or partitioned table; analyzed like a base table.
    Partition,
    /// Named query with no storage of its own.
    View,
    /// Anything else (foreign table, sequence, composite type, ...).
    Other,
}

impl RelationKind {
    /// Map a `pg_class.relkind` code.
    ///
    /// Materialized views hold rows and accept `ANALYZE`, so they count as base tables.
    pub fn from_relkind(code: &str) -> Self {
        match code {
            "r" | "m" => RelationKind::BaseTable,
            "p" => RelationKind::Partition,
            "v" => RelationKind::View,
            _ => RelationKind::Other,
        }
    }

    /// Returns `true` for kinds that hold rows and therefore carry statistics.
    pub fn is_storage_backed(self) -> bool {
        matches!(self, RelationKind::BaseTable | RelationKind::Partition)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::BaseTable => write!(f, "table"),
            RelationKind::Partition => write!(f, "partition"),
            RelationKind::View => write!(f, "view"),
            RelationKind::Other => write!(f, "other"),
        }
    }
}

/// Role name of a relation owner or session user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Build a user id from a role name.
    pub fn new(name: impl Into<String>) -> Self {
        UserId(name.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One catalogued relation, fetched fresh for every analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    /// Catalog id.
    pub id: RelationId,
    /// Schema (namespace) the relation lives in.
    pub schema: String,
    /// Unqualified relation name.
    pub name: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Owning role.
    pub owner: UserId,
}

impl RelationRecord {
    /// Schema-qualified, quoted name suitable for a maintenance command.
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

/// Name → id resolution used by parse-analysis.
pub trait RelationResolver {
    /// Resolve a possibly schema-qualified relation name.
    ///
    /// Returns `Ok(None)` when nothing by that name exists.
    fn resolve(&self, schema: Option<&str>, name: &str) -> Result<Option<RelationId>, CatalogError>;
}

/// Read access to relation metadata plus the statistics-collection action.
///
/// Methods take `&self`: one catalog serves one session at a time and
/// implementations keep any mutable state behind interior mutability.
pub trait RelationCatalog: RelationResolver {
    /// Fetch the record for `id`.
    fn lookup(&self, id: RelationId) -> Result<RelationRecord, CatalogError>;

    /// Relations directly referenced by the defining rule of view `id`.
    ///
    /// An empty result means the view reads nothing further.
    fn view_dependencies(&self, id: RelationId) -> Result<Vec<RelationRecord>, CatalogError>;

    /// Number of statistics entries currently stored for `id`.
    fn statistics_count(&self, id: RelationId) -> Result<u64, CatalogError>;

    /// Collect statistics for the relation named `relation_name`.
    fn run_maintenance(&self, relation_name: &str) -> Result<(), CatalogError>;
}

impl<C: RelationResolver + ?Sized> RelationResolver for &C {
    fn resolve(&self, schema: Option<&str>, name: &str) -> Result<Option<RelationId>, CatalogError> {
        (**self).resolve(schema, name)
    }
}

impl<C: RelationCatalog + ?Sized> RelationCatalog for &C {
    fn lookup(&self, id: RelationId) -> Result<RelationRecord, CatalogError> {
        (**self).lookup(id)
    }

    fn view_dependencies(&self, id: RelationId) -> Result<Vec<RelationRecord>, CatalogError> {
        (**self).view_dependencies(id)
    }

    fn statistics_count(&self, id: RelationId) -> Result<u64, CatalogError> {
        (**self).statistics_count(id)
    }

    fn run_maintenance(&self, relation_name: &str) -> Result<(), CatalogError> {
        (**self).run_maintenance(relation_name)
    }
}

use crate::catalog::RelationId;

/// Statement class of an analyzed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `SELECT`, `VALUES`, `WITH ... SELECT`, set operations.
    Select,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// `MERGE`.
    Merge,
    /// DDL, `ANALYZE`, `SET`, transaction control and everything else.
    Utility,
}

/// A parse-analyzed statement: the structure the statistics walker consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTree {
    /// Statement class.
    pub command: CommandKind,
    /// Range table: every `FROM`/`JOIN` item, DML target and derived table.
    pub range_table: Vec<RangeTblEntry>,
    /// `WITH` definitions attached to this query level.
    pub ctes: Vec<CommonTableExpr>,
    /// Expressions evaluated at this level (targets, quals, `RETURNING`, ...).
    pub quals: Vec<QueryExpr>,
}

impl QueryTree {
    /// An empty tree of the given command.
    pub fn new(command: CommandKind) -> Self {
        Self {
            command,
            range_table: Vec::new(),
            ctes: Vec::new(),
            quals: Vec::new(),
        }
    }

    /// A utility statement: nothing to read.
    pub fn utility() -> Self {
        Self::new(CommandKind::Utility)
    }

    /// Returns `true` for utility statements.
    pub fn is_utility(&self) -> bool {
        self.command == CommandKind::Utility
    }
}

/// One item of a query's range table.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeTblEntry {
    /// A catalogued relation. `relid` is [`RelationId::INVALID`] for unresolved placeholders.
    Relation {
        /// Catalog id of the relation.
        relid: RelationId,
        /// Name the relation is referenced by in the query.
        alias: String,
    },
    /// A derived table.
    Subquery {
        /// The nested query.
        query: Box<QueryTree>,
        /// Alias, when given.
        alias: Option<String>,
    },
    /// A reference to a `WITH` item; the definition lives in [`QueryTree::ctes`].
    CteRef {
        /// CTE name.
        name: String,
    },
    /// A set-returning function in `FROM`.
    Function {
        /// Call arguments.
        args: Vec<QueryExpr>,
    },
    /// A `VALUES` list in `FROM` or as a statement body.
    Values {
        /// Row expressions, flattened.
        rows: Vec<QueryExpr>,
    },
}

/// A `WITH` item.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    /// CTE name.
    pub name: String,
    /// Defining query.
    pub query: Box<QueryTree>,
}

/// How a sub-link's result is consumed by its parent expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubLinkKind {
    /// `EXISTS (...)`.
    Exists,
    /// `x IN (...)`, `x op ANY (...)`, `x op ALL (...)`.
    Any,
    /// Scalar sub-select.
    Expr,
}

/// Expression tree reduced to what relation discovery needs.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// A query embedded in an expression.
    SubLink {
        /// How the result is used.
        kind: SubLinkKind,
        /// The embedded query.
        query: Box<QueryTree>,
    },
    /// An expression with sub-expressions.
    Composite(Vec<QueryExpr>),
    /// A leaf that cannot contain a query (column, constant, parameter).
    Opaque,
}

impl QueryExpr {
    /// Build a composite node, collapsing it when no child can hold a sub-link.
    pub fn composite(children: Vec<QueryExpr>) -> Self {
        let children: Vec<QueryExpr> = children
            .into_iter()
            .filter(|child| !matches!(child, QueryExpr::Opaque))
            .collect();
        match children.len() {
            0 => QueryExpr::Opaque,
            1 => children.into_iter().next().unwrap_or(QueryExpr::Opaque),
            _ => QueryExpr::Composite(children),
        }
    }

    /// Returns `true` when this expression contains at least one sub-link.
    pub fn has_sublinks(&self) -> bool {
        match self {
            QueryExpr::SubLink { .. } => true,
            QueryExpr::Composite(children) => children.iter().any(QueryExpr::has_sublinks),
            QueryExpr::Opaque => false,
        }
    }
}

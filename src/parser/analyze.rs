use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, FromTable, ObjectName, Query, SetExpr, Statement, TableAlias, TableFactor, TableObject,
    TableWithJoins, UpdateTableFromKind, Visit, Visitor,
};
use tracing::debug;

use crate::catalog::{RelationId, RelationResolver};
use crate::error::AnalyzeError;
use crate::parser::names::{fold_ident, object_name_parts};
use crate::parser::query_tree::{
    CommandKind, CommonTableExpr, QueryExpr, QueryTree, RangeTblEntry, SubLinkKind,
};

/// Schemas whose unresolvable relations become placeholder entries instead of errors.
const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema"];

/// Parse-analyze one statement against `resolver`.
///
/// Relation names are resolved to catalog ids; `WITH` names in scope become
/// [`RangeTblEntry::CteRef`]. Statements that read no relations (DDL, `SET`,
/// `ANALYZE`, ...) yield a utility tree.
pub fn analyze_statement(
    statement: &Statement,
    resolver: &dyn RelationResolver,
) -> Result<QueryTree, AnalyzeError> {
    Analyzer::new(resolver).statement(statement)
}

struct Analyzer<'r> {
    resolver: &'r dyn RelationResolver,
    cte_scopes: Vec<Vec<String>>,
}

impl<'r> Analyzer<'r> {
    fn new(resolver: &'r dyn RelationResolver) -> Self {
        Self {
            resolver,
            cte_scopes: Vec::new(),
        }
    }

    fn statement(&mut self, statement: &Statement) -> Result<QueryTree, AnalyzeError> {
        match statement {
            Statement::Query(query) => self.query(query),
            Statement::Insert(insert) => {
                let mut tree = QueryTree::new(CommandKind::Insert);
                if let TableObject::TableName(name) = &insert.table {
                    let entry = self.relation_entry(name, None)?;
                    tree.range_table.push(entry);
                }
                if let Some(source) = &insert.source {
                    let query = self.query(source)?;
                    tree.range_table.push(RangeTblEntry::Subquery {
                        query: Box::new(query),
                        alias: Some("*SELECT*".to_string()),
                    });
                }
                self.push_quals(&mut tree, &insert.on)?;
                self.push_quals(&mut tree, &insert.returning)?;
                Ok(tree)
            }
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            } => {
                let mut tree = QueryTree::new(CommandKind::Update);
                self.table_with_joins(table, &mut tree)?;
                if let Some(
                    UpdateTableFromKind::BeforeSet(sources) | UpdateTableFromKind::AfterSet(sources),
                ) = from
                {
                    for source in sources {
                        self.table_with_joins(source, &mut tree)?;
                    }
                }
                self.push_quals(&mut tree, assignments)?;
                self.push_quals(&mut tree, selection)?;
                self.push_quals(&mut tree, returning)?;
                Ok(tree)
            }
            Statement::Delete(delete) => {
                let mut tree = QueryTree::new(CommandKind::Delete);
                let (FromTable::WithFromKeyword(targets) | FromTable::WithoutKeyword(targets)) =
                    &delete.from;
                for target in targets {
                    self.table_with_joins(target, &mut tree)?;
                }
                for source in delete.using.iter().flatten() {
                    self.table_with_joins(source, &mut tree)?;
                }
                self.push_quals(&mut tree, &delete.selection)?;
                self.push_quals(&mut tree, &delete.returning)?;
                Ok(tree)
            }
            Statement::Merge {
                table,
                source,
                on,
                clauses,
                output,
                ..
            } => {
                let mut tree = QueryTree::new(CommandKind::Merge);
                self.table_factor(table, &mut tree)?;
                self.table_factor(source, &mut tree)?;
                self.push_quals(&mut tree, on)?;
                self.push_quals(&mut tree, clauses)?;
                self.push_quals(&mut tree, output)?;
                Ok(tree)
            }
            Statement::Explain { statement, .. } => self.statement(statement),
            _ => Ok(QueryTree::utility()),
        }
    }

    fn query(&mut self, query: &Query) -> Result<QueryTree, AnalyzeError> {
        self.cte_scopes.push(Vec::new());
        let result = self.query_in_scope(query);
        self.cte_scopes.pop();
        result
    }

    fn query_in_scope(&mut self, query: &Query) -> Result<QueryTree, AnalyzeError> {
        let mut tree = QueryTree::new(CommandKind::Select);

        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let name = fold_ident(&cte.alias.name);
                // A recursive CTE may reference itself from its own body.
                if with.recursive {
                    self.declare_cte(name.clone());
                }
                let definition = self.query(&cte.query)?;
                if !with.recursive {
                    self.declare_cte(name.clone());
                }
                tree.ctes.push(CommonTableExpr {
                    name,
                    query: Box::new(definition),
                });
            }
        }

        self.set_expr(&query.body, &mut tree)?;
        self.push_quals(&mut tree, &query.order_by)?;
        self.push_quals(&mut tree, &query.limit_clause)?;
        Ok(tree)
    }

    fn declare_cte(&mut self, name: String) {
        if let Some(scope) = self.cte_scopes.last_mut() {
            scope.push(name);
        }
    }

    fn cte_in_scope(&self, name: &str) -> bool {
        self.cte_scopes
            .iter()
            .any(|scope| scope.iter().any(|cte| cte == name))
    }

    fn set_expr(&mut self, body: &SetExpr, tree: &mut QueryTree) -> Result<(), AnalyzeError> {
        match body {
            SetExpr::Select(select) => {
                for from in &select.from {
                    self.table_with_joins(from, tree)?;
                }
                self.push_quals(tree, &select.projection)?;
                self.push_quals(tree, &select.selection)?;
                self.push_quals(tree, &select.group_by)?;
                self.push_quals(tree, &select.having)?;
                self.push_quals(tree, &select.named_window)?;
                self.push_quals(tree, &select.qualify)?;
                Ok(())
            }
            SetExpr::Query(query) => {
                let nested = self.query(query)?;
                tree.range_table.push(RangeTblEntry::Subquery {
                    query: Box::new(nested),
                    alias: None,
                });
                Ok(())
            }
            SetExpr::SetOperation { left, right, .. } => {
                for arm in [left, right] {
                    let mut nested = QueryTree::new(CommandKind::Select);
                    self.set_expr(arm, &mut nested)?;
                    tree.range_table.push(RangeTblEntry::Subquery {
                        query: Box::new(nested),
                        alias: None,
                    });
                }
                Ok(())
            }
            SetExpr::Values(values) => {
                let mut rows = Vec::new();
                for expr in values.rows.iter().flatten() {
                    rows.push(self.sublinks_in(expr)?);
                }
                rows.retain(QueryExpr::has_sublinks);
                tree.range_table.push(RangeTblEntry::Values { rows });
                Ok(())
            }
            SetExpr::Insert(statement)
            | SetExpr::Update(statement)
            | SetExpr::Delete(statement)
            | SetExpr::Merge(statement) => {
                let nested = self.statement(statement)?;
                tree.range_table.push(RangeTblEntry::Subquery {
                    query: Box::new(nested),
                    alias: None,
                });
                Ok(())
            }
            SetExpr::Table(table) => {
                let Some(name) = &table.table_name else {
                    return Ok(());
                };
                let entry = self.resolve_entry(table.schema_name.as_deref(), name, None)?;
                tree.range_table.push(entry);
                Ok(())
            }
        }
    }

    fn table_with_joins(
        &mut self,
        table: &TableWithJoins,
        tree: &mut QueryTree,
    ) -> Result<(), AnalyzeError> {
        self.table_factor(&table.relation, tree)?;
        for join in &table.joins {
            self.table_factor(&join.relation, tree)?;
            self.push_quals(tree, &join.join_operator)?;
        }
        Ok(())
    }

    fn table_factor(
        &mut self,
        factor: &TableFactor,
        tree: &mut QueryTree,
    ) -> Result<(), AnalyzeError> {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                let entry = match args {
                    Some(call) => RangeTblEntry::Function {
                        args: vec![self.sublinks_in(&call.args)?],
                    },
                    None => self.relation_entry(name, alias.as_ref())?,
                };
                tree.range_table.push(entry);
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let nested = self.query(subquery)?;
                tree.range_table.push(RangeTblEntry::Subquery {
                    query: Box::new(nested),
                    alias: alias.as_ref().map(|a| fold_ident(&a.name)),
                });
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins, tree)?,
            TableFactor::Function { args, .. } => {
                let args = vec![self.sublinks_in(args)?];
                tree.range_table.push(RangeTblEntry::Function { args });
            }
            TableFactor::TableFunction { expr, .. } => {
                let args = vec![self.sublinks_in(expr)?];
                tree.range_table.push(RangeTblEntry::Function { args });
            }
            TableFactor::UNNEST { array_exprs, .. } => {
                let args = vec![self.sublinks_in(array_exprs)?];
                tree.range_table.push(RangeTblEntry::Function { args });
            }
            other => debug!(factor = %other, "skipping unsupported FROM item"),
        }
        Ok(())
    }

    fn relation_entry(
        &mut self,
        name: &ObjectName,
        alias: Option<&TableAlias>,
    ) -> Result<RangeTblEntry, AnalyzeError> {
        let (schema, relation) = object_name_parts(name);
        let alias = alias.map(|a| fold_ident(&a.name));
        self.resolve_entry(schema.as_deref(), &relation, alias)
    }

    fn resolve_entry(
        &mut self,
        schema: Option<&str>,
        relation: &str,
        alias: Option<String>,
    ) -> Result<RangeTblEntry, AnalyzeError> {
        if schema.is_none() && self.cte_in_scope(relation) {
            return Ok(RangeTblEntry::CteRef {
                name: relation.to_string(),
            });
        }

        let alias = alias.unwrap_or_else(|| relation.to_string());
        match self.resolver.resolve(schema, relation)? {
            Some(relid) => Ok(RangeTblEntry::Relation { relid, alias }),
            None if is_system_relation(schema, relation) => {
                debug!(relation, "unresolved system relation kept as placeholder");
                Ok(RangeTblEntry::Relation {
                    relid: RelationId::INVALID,
                    alias,
                })
            }
            None => Err(AnalyzeError::UnknownRelation(match schema {
                Some(schema) => format!("{schema}.{relation}"),
                None => relation.to_string(),
            })),
        }
    }

    fn push_quals<V: Visit>(&mut self, tree: &mut QueryTree, node: &V) -> Result<(), AnalyzeError> {
        let expr = self.sublinks_in(node)?;
        if expr.has_sublinks() {
            tree.quals.push(expr);
        }
        Ok(())
    }

    /// Collect the outermost queries embedded in `node` as sub-links.
    fn sublinks_in<V: Visit>(&mut self, node: &V) -> Result<QueryExpr, AnalyzeError> {
        let mut collector = SubLinkCollector {
            analyzer: self,
            depth: 0,
            found: Vec::new(),
        };
        if let ControlFlow::Break(err) = node.visit(&mut collector) {
            return Err(err);
        }
        let found = collector.found;
        Ok(QueryExpr::composite(found))
    }
}

fn is_system_relation(schema: Option<&str>, relation: &str) -> bool {
    match schema {
        Some(schema) => SYSTEM_SCHEMAS.contains(&schema),
        None => relation.starts_with("pg_"),
    }
}

/// Finds sub-selects inside an expression without descending into them twice:
/// only depth-0 queries are analyzed, nested ones are reached through that analysis.
struct SubLinkCollector<'a, 'r> {
    analyzer: &'a mut Analyzer<'r>,
    depth: usize,
    found: Vec<QueryExpr>,
}

impl SubLinkCollector<'_, '_> {
    fn record(&mut self, kind: SubLinkKind, query: &Query) -> ControlFlow<AnalyzeError> {
        match self.analyzer.query(query) {
            Ok(tree) => {
                self.found.push(QueryExpr::SubLink {
                    kind,
                    query: Box::new(tree),
                });
                ControlFlow::Continue(())
            }
            Err(err) => ControlFlow::Break(err),
        }
    }
}

fn sublink_of(expr: &Expr) -> Option<(SubLinkKind, &Query)> {
    match expr {
        Expr::Exists { subquery, .. } => Some((SubLinkKind::Exists, subquery.as_ref())),
        Expr::InSubquery { subquery, .. } => Some((SubLinkKind::Any, subquery.as_ref())),
        Expr::Subquery(subquery) => Some((SubLinkKind::Expr, subquery.as_ref())),
        _ => None,
    }
}

impl Visitor for SubLinkCollector<'_, '_> {
    type Break = AnalyzeError;

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Some((kind, query)) = sublink_of(expr) {
            if self.depth == 0 {
                self.record(kind, query)?;
            }
            self.depth += 1;
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if sublink_of(expr).is_some() {
            self.depth -= 1;
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        // Queries not wrapped in a sub-link expression, e.g. `ARRAY(SELECT ...)`.
        if self.depth == 0 {
            self.record(SubLinkKind::Expr, query)?;
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }
}

use std::collections::VecDeque;

use tracing::debug;

use crate::parser::query_tree::{QueryExpr, QueryTree, RangeTblEntry};
use crate::stats::relation_set::RelationSet;

/// A pending piece of the tree: either a query level whose range table,
/// CTEs and quals still need scanning, or an expression that may hold sub-links.
enum WorkItem<'q> {
    Query(&'q QueryTree),
    Expr(&'q QueryExpr),
}

/// Collect every relation id read by `query` and by all queries nested in it.
///
/// Derived tables, CTE definitions, set-operation arms and sub-links in any
/// expression are followed. Placeholder ids (`0`) are skipped. The walk uses
/// an explicit FIFO work-list, so nesting depth never grows the call stack and
/// ids come out in the order their range-table entries are reached.
pub fn discover(query: &QueryTree) -> RelationSet {
    let mut found = RelationSet::new();
    let mut work = VecDeque::from([WorkItem::Query(query)]);

    while let Some(item) = work.pop_front() {
        match item {
            WorkItem::Query(level) => {
                for entry in &level.range_table {
                    match entry {
                        RangeTblEntry::Relation { relid, alias } => {
                            if relid.is_invalid() {
                                debug!(alias = %alias, "skipping placeholder range-table entry");
                                continue;
                            }
                            if found.insert(*relid) {
                                debug!(%relid, alias = %alias, "discovered relation");
                            }
                        }
                        RangeTblEntry::Subquery { query, .. } => {
                            work.push_back(WorkItem::Query(query));
                        }
                        RangeTblEntry::CteRef { .. } => {}
                        RangeTblEntry::Function { args } => {
                            work.extend(args.iter().map(WorkItem::Expr));
                        }
                        RangeTblEntry::Values { rows } => {
                            work.extend(rows.iter().map(WorkItem::Expr));
                        }
                    }
                }
                work.extend(level.ctes.iter().map(|cte| WorkItem::Query(&cte.query)));
                work.extend(level.quals.iter().map(WorkItem::Expr));
            }
            WorkItem::Expr(QueryExpr::SubLink { query, .. }) => {
                work.push_back(WorkItem::Query(query));
            }
            WorkItem::Expr(QueryExpr::Composite(children)) => {
                work.extend(children.iter().map(WorkItem::Expr));
            }
            WorkItem::Expr(QueryExpr::Opaque) => {}
        }
    }

    found
}

/// Parse-analysis: resolves a parsed statement into a [`query_tree::QueryTree`].
pub mod analyze;
/// Identifier folding, quoting and schema-qualified name helpers.
pub mod names;
/// The analyzed query structure walked by the statistics core.
pub mod query_tree;
/// Thin wrapper around `sqlparser` for statement parsing.
pub mod sql_parser;

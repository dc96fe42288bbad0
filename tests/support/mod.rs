#![allow(dead_code)]

use std::path::PathBuf;

use jit_stats::catalog::memory::MemoryCatalog;
use jit_stats::catalog::{RelationId, UserId};
use jit_stats::parser::analyze::analyze_statement;
use jit_stats::parser::query_tree::QueryTree;
use jit_stats::parser::sql_parser;
use jit_stats::stats::guard::{SessionContext, SessionUser};
use jit_stats::stats::hook::HostQuery;

pub(crate) const OWNER: &str = "app";

pub(crate) fn fixture_dir(fixture: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(fixture)
}

pub(crate) fn read_fixture_sql(fixture: &str, file: &str) -> String {
    let path = fixture_dir(fixture).join(file);
    std::fs::read_to_string(path).expect("fixture SQL should be readable")
}

/// Catalog built from `tests/fixtures/<fixture>/schema.sql`, owned by [`OWNER`].
pub(crate) fn load_catalog(fixture: &str) -> MemoryCatalog {
    MemoryCatalog::from_ddl(&read_fixture_sql(fixture, "schema.sql"), &UserId::new(OWNER))
        .unwrap_or_else(|e| panic!("fixture schema should load: {e}"))
}

pub(crate) fn analyze(catalog: &MemoryCatalog, sql: &str) -> QueryTree {
    let statements = sql_parser::parse_statements(sql).expect("query should parse");
    assert_eq!(statements.len(), 1, "expected exactly one statement in {sql}");
    analyze_statement(&statements[0], catalog)
        .unwrap_or_else(|e| panic!("query should analyze: {e}"))
}

pub(crate) fn host_query(catalog: &MemoryCatalog, sql: &str) -> HostQuery {
    HostQuery::new(sql, analyze(catalog, sql))
}

pub(crate) fn owner_session() -> SessionContext {
    SessionContext::new(SessionUser::new(OWNER))
}

pub(crate) fn id(catalog: &MemoryCatalog, name: &str) -> RelationId {
    catalog
        .relation_id("public", name)
        .unwrap_or_else(|| panic!("fixture should define {name}"))
}

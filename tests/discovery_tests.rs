use jit_stats::catalog::RelationId;
use jit_stats::stats::walker::discover;

mod support;

#[test]
fn query_without_relations_discovers_nothing() {
    let catalog = support::load_catalog("scenarios");
    assert!(discover(&support::analyze(&catalog, "select 1 + 1")).is_empty());
    assert!(discover(&support::analyze(&catalog, "values (1), (2)")).is_empty());
}

#[test]
fn scalar_subselect_scenario_discovers_both_tables() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(
        &catalog,
        "select * from t41 where x1 = (select max(x2) from t42)",
    );

    let found: Vec<RelationId> = discover(&query).iter().collect();
    assert_eq!(
        found,
        vec![support::id(&catalog, "t41"), support::id(&catalog, "t42")]
    );
}

#[test]
fn relation_read_directly_and_through_a_subquery_is_reported_once() {
    let catalog = support::load_catalog("scenarios");
    for sql in [
        "select * from t41 where x1 in (select x1 from t41)",
        "select * from t41, (select * from t41) as again",
        "select * from t41 where exists (select 1 from t41 inner_t where inner_t.x1 = t41.x1)",
    ] {
        let found = discover(&support::analyze(&catalog, sql));
        assert_eq!(found.len(), 1, "duplicate discovery for {sql}");
        assert!(found.contains(support::id(&catalog, "t41")));
    }
}

#[test]
fn ctes_derived_tables_and_set_operations_are_followed() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(
        &catalog,
        "with recent as (select x2 from t42)
         select x1 from (select x1 from t41) d
         union all
         select x2 from recent
         union all
         select a from t500",
    );

    let found = discover(&query);
    assert_eq!(found.len(), 3);
    for name in ["t41", "t42", "t500"] {
        assert!(found.contains(support::id(&catalog, name)), "missing {name}");
    }
}

#[test]
fn sublinks_in_projection_and_having_are_found() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(
        &catalog,
        "select (select count(*) from t42) as c
         from t41
         group by x1
         having x1 > (select min(a) from t500)",
    );

    let found = discover(&query);
    assert_eq!(found.len(), 3);
}

#[test]
fn dml_targets_and_sources_are_discovered() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(
        &catalog,
        "insert into t41 (x1) select x2 from t42 where x2 in (select a from t500)",
    );

    let found = discover(&query);
    assert_eq!(
        found.iter().collect::<Vec<_>>(),
        vec![
            support::id(&catalog, "t41"),
            support::id(&catalog, "t42"),
            support::id(&catalog, "t500"),
        ]
    );
}

#[test]
fn data_modifying_cte_bodies_are_discovered() {
    let catalog = support::load_catalog("scenarios");
    for sql in [
        "with d as (delete from t41 returning *) select * from t42",
        "with u as (update t41 set x1 = 0 returning *) select * from t42",
    ] {
        let found = discover(&support::analyze(&catalog, sql));
        assert_eq!(found.len(), 2, "{sql}");
        assert!(found.contains(support::id(&catalog, "t41")), "{sql}");
        assert!(found.contains(support::id(&catalog, "t42")), "{sql}");
    }
}

#[test]
fn merge_target_source_and_condition_sublinks_are_discovered() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(
        &catalog,
        "merge into t41 using t42 on t41.x1 = t42.x2
         when matched and t42.x2 in (select a from t500) then delete
         when not matched then insert (x1) values (t42.x2)",
    );

    let found = discover(&query);
    assert_eq!(found.len(), 3);
    for name in ["t41", "t42", "t500"] {
        assert!(found.contains(support::id(&catalog, name)), "{name} missing");
    }
}

#[test]
fn window_clause_sublinks_are_discovered() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(
        &catalog,
        "select * from t41 window w as (order by (select 1 from t42))",
    );
    assert_eq!(discover(&query).len(), 2);
}

#[test]
fn utility_statements_discover_nothing() {
    let catalog = support::load_catalog("scenarios");
    for sql in ["set work_mem = '64MB'", "analyze t41", "create table t99 (a int)"] {
        assert!(discover(&support::analyze(&catalog, sql)).is_empty(), "{sql}");
    }
}

#[test]
fn system_relations_that_do_not_resolve_are_skipped() {
    let catalog = support::load_catalog("scenarios");
    let query = support::analyze(&catalog, "select * from pg_catalog.pg_class, t41");
    assert_eq!(
        discover(&query).iter().collect::<Vec<_>>(),
        vec![support::id(&catalog, "t41")]
    );
}

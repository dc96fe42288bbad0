use tracing::{debug, info};

use crate::catalog::{RelationCatalog, RelationId, RelationKind, RelationRecord};
use crate::config::Config;
use crate::error::StatsError;
use crate::parser::query_tree::QueryTree;
use crate::stats::guard::SessionContext;
use crate::stats::relation_set::RelationSet;
use crate::stats::view_resolver::ViewDependencyResolver;
use crate::stats::walker;

/// What one pass decided for one storage-backed relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationAction {
    /// Statistics were missing and maintenance ran.
    Analyzed(RelationRecord),
    /// Statistics were already present.
    AlreadyHasStatistics {
        /// The relation.
        relation: RelationRecord,
        /// Number of statistics entries found.
        count: u64,
    },
    /// The session user may not maintain this relation.
    Denied(RelationRecord),
    /// The relation lives in an excluded schema.
    Excluded(RelationRecord),
}

impl RelationAction {
    /// The relation the action applies to.
    pub fn relation(&self) -> &RelationRecord {
        match self {
            RelationAction::Analyzed(relation)
            | RelationAction::Denied(relation)
            | RelationAction::Excluded(relation)
            | RelationAction::AlreadyHasStatistics { relation, .. } => relation,
        }
    }

    /// Short label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            RelationAction::Analyzed(_) => "analyzed",
            RelationAction::AlreadyHasStatistics { .. } => "has statistics",
            RelationAction::Denied(_) => "denied",
            RelationAction::Excluded(_) => "excluded",
        }
    }
}

/// Everything a completed pass found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Relations the query reads directly or through nested queries.
    pub referenced: RelationSet,
    /// Storage-backed relations left after view expansion.
    pub targets: RelationSet,
    /// One decision per target, in target order.
    pub actions: Vec<RelationAction>,
}

impl AnalysisReport {
    /// Relations maintenance ran for.
    pub fn analyzed(&self) -> impl Iterator<Item = &RelationRecord> {
        self.actions.iter().filter_map(|action| match action {
            RelationAction::Analyzed(relation) => Some(relation),
            _ => None,
        })
    }

    /// Relations skipped because the session user was not authorized.
    pub fn denied(&self) -> impl Iterator<Item = &RelationRecord> {
        self.actions.iter().filter_map(|action| match action {
            RelationAction::Denied(relation) => Some(relation),
            _ => None,
        })
    }
}

/// Result of [`StatisticsCoordinator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Another pass already held the session guard; nothing was done.
    Skipped,
    /// The pass ran to completion.
    Completed(AnalysisReport),
}

impl AnalysisOutcome {
    /// The report of a completed pass.
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Skipped => None,
            AnalysisOutcome::Completed(report) => Some(report),
        }
    }
}

/// Makes sure every relation a query reads has planner statistics.
///
/// The coordinator holds only configuration. The catalog and the session
/// are passed to each call, so a catalog whose maintenance action issues
/// further queries can route them back through the same coordinator and
/// the session guard turns those nested calls into [`AnalysisOutcome::Skipped`].
#[derive(Debug, Clone, Default)]
pub struct StatisticsCoordinator {
    config: Config,
}

impl StatisticsCoordinator {
    /// Coordinator applying `config`.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one analysis pass for `query`.
    ///
    /// The session guard is held for the whole pass and released on every
    /// exit path, including errors.
    pub fn run<C: RelationCatalog + ?Sized>(
        &self,
        catalog: &C,
        session: &SessionContext,
        query: &QueryTree,
    ) -> Result<AnalysisOutcome, StatsError> {
        let Some(_token) = session.guard().try_enter() else {
            debug!("analysis pass already active, skipping nested call");
            return Ok(AnalysisOutcome::Skipped);
        };
        session.record_pass();

        let referenced = walker::discover(query);
        debug!(count = referenced.len(), "relations referenced by query");

        let targets = self.collect_targets(catalog, &referenced)?;
        let mut actions = Vec::with_capacity(targets.len());
        for id in &targets {
            actions.push(self.maintain(catalog, session, id)?);
        }

        Ok(AnalysisOutcome::Completed(AnalysisReport {
            referenced,
            targets,
            actions,
        }))
    }

    fn collect_targets<C: RelationCatalog + ?Sized>(
        &self,
        catalog: &C,
        referenced: &RelationSet,
    ) -> Result<RelationSet, StatsError> {
        let resolver = ViewDependencyResolver::new(catalog);
        let mut targets = RelationSet::new();

        for id in referenced {
            let record = lookup(catalog, id)?;
            if record.kind.is_storage_backed() {
                targets.insert(id);
                continue;
            }
            if self.config.is_excluded_schema(&record.schema) {
                debug!(relation = %record.qualified_name(), kind = %record.kind, "not expanding relation in excluded schema");
                continue;
            }
            if record.kind != RelationKind::View {
                return Err(StatsError::UnexpectedKind {
                    id,
                    name: record.qualified_name(),
                    kind: record.kind,
                });
            }
            let bases = resolver.expand(id)?;
            debug!(view = %record.qualified_name(), bases = bases.len(), "expanded view");
            targets.extend_from(&bases);
        }

        Ok(targets)
    }

    fn maintain<C: RelationCatalog + ?Sized>(
        &self,
        catalog: &C,
        session: &SessionContext,
        id: RelationId,
    ) -> Result<RelationAction, StatsError> {
        let record = lookup(catalog, id)?;
        let name = record.qualified_name();

        if self.config.is_excluded_schema(&record.schema) {
            debug!(relation = %name, "relation in excluded schema");
            return Ok(RelationAction::Excluded(record));
        }

        let user = session.user();
        if !user.may_maintain(&record.owner) {
            if self.config.report_denials {
                info!(relation = %name, user = %user.name, owner = %record.owner, "not authorized to analyze relation");
            } else {
                debug!(relation = %name, user = %user.name, owner = %record.owner, "not authorized to analyze relation");
            }
            return Ok(RelationAction::Denied(record));
        }

        let count = catalog
            .statistics_count(id)
            .map_err(|source| StatsError::CatalogInconsistency { id, source })?;
        if count > 0 {
            debug!(relation = %name, count, "statistics present");
            return Ok(RelationAction::AlreadyHasStatistics {
                relation: record,
                count,
            });
        }

        info!(relation = %name, "no statistics found, running analyze");
        catalog
            .run_maintenance(&name)
            .map_err(|e| StatsError::Maintenance {
                relation: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(RelationAction::Analyzed(record))
    }
}

fn lookup<C: RelationCatalog + ?Sized>(
    catalog: &C,
    id: RelationId,
) -> Result<RelationRecord, StatsError> {
    catalog
        .lookup(id)
        .map_err(|source| StatsError::CatalogInconsistency { id, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryCatalog;
    use crate::catalog::UserId;
    use crate::error::CatalogError;
    use crate::parser::query_tree::{CommandKind, RangeTblEntry};
    use crate::stats::guard::SessionUser;

    fn select_from(ids: &[RelationId]) -> QueryTree {
        QueryTree {
            range_table: ids
                .iter()
                .map(|&relid| RangeTblEntry::Relation {
                    relid,
                    alias: format!("r{relid}"),
                })
                .collect(),
            ..QueryTree::new(CommandKind::Select)
        }
    }

    fn owner_session() -> SessionContext {
        SessionContext::new(SessionUser::new("app"))
    }

    #[test]
    fn held_guard_skips_the_pass() {
        let catalog = MemoryCatalog::new();
        let t = catalog.add_relation("public", "t", RelationKind::BaseTable, UserId::new("app"));
        let session = owner_session();
        let coordinator = StatisticsCoordinator::default();

        let _held = session.guard().try_enter().unwrap();
        let outcome = coordinator.run(&catalog, &session, &select_from(&[t])).unwrap();
        assert_eq!(outcome, AnalysisOutcome::Skipped);
        assert_eq!(session.passes_started(), 0);
        assert!(catalog.maintenance_log().is_empty());
    }

    #[test]
    fn excluded_schema_is_reported_not_analyzed() {
        let catalog = MemoryCatalog::new();
        let class = catalog.add_relation(
            "pg_catalog",
            "pg_class",
            RelationKind::BaseTable,
            UserId::new("app"),
        );
        let outcome = StatisticsCoordinator::default()
            .run(&catalog, &owner_session(), &select_from(&[class]))
            .unwrap();

        let report = outcome.report().unwrap();
        assert!(matches!(report.actions.as_slice(), [RelationAction::Excluded(r)] if r.id == class));
        assert!(catalog.maintenance_log().is_empty());
    }

    #[test]
    fn views_in_excluded_schemas_are_not_expanded() {
        let catalog = MemoryCatalog::new();
        let seq = catalog.add_relation("pg_catalog", "s", RelationKind::Other, UserId::new("app"));
        let view = catalog.add_view("pg_catalog", "pg_stats", UserId::new("app"), &[seq]);

        let outcome = StatisticsCoordinator::default()
            .run(&catalog, &owner_session(), &select_from(&[view]))
            .unwrap();
        assert!(outcome.report().unwrap().targets.is_empty());
        assert_eq!(catalog.view_dependency_calls(view), 0);
    }

    #[test]
    fn directly_referenced_other_kind_is_fatal() {
        let catalog = MemoryCatalog::new();
        let seq = catalog.add_relation("public", "s", RelationKind::Other, UserId::new("app"));
        let session = owner_session();

        let err = StatisticsCoordinator::default()
            .run(&catalog, &session, &select_from(&[seq]))
            .expect_err("sequence in range table is fatal");
        assert!(matches!(err, StatsError::UnexpectedKind { id, .. } if id == seq));
        assert!(!session.guard().is_active());
    }

    #[test]
    fn unknown_id_is_a_catalog_inconsistency_and_releases_guard() {
        let catalog = MemoryCatalog::new();
        let session = owner_session();
        let err = StatisticsCoordinator::default()
            .run(&catalog, &session, &select_from(&[RelationId(77)]))
            .expect_err("unknown id");
        assert_eq!(
            err,
            StatsError::CatalogInconsistency {
                id: RelationId(77),
                source: CatalogError::NotFound(RelationId(77)),
            }
        );
        assert!(!session.guard().is_active());
        assert!(session.guard().try_enter().is_some());
    }

    #[test]
    fn maintenance_failure_stops_the_pass() {
        let catalog = MemoryCatalog::new();
        let a = catalog.add_relation("public", "a", RelationKind::BaseTable, UserId::new("app"));
        let b = catalog.add_relation("public", "b", RelationKind::BaseTable, UserId::new("app"));
        catalog.fail_maintenance_for("public.a");
        let session = owner_session();

        let err = StatisticsCoordinator::default()
            .run(&catalog, &session, &select_from(&[a, b]))
            .expect_err("maintenance failure is fatal");
        assert!(matches!(err, StatsError::Maintenance { ref relation, .. } if relation == "public.a"));
        assert_eq!(catalog.maintenance_log(), vec!["public.a".to_string()]);
        assert!(!session.guard().is_active());
    }

    #[test]
    fn superuser_may_analyze_foreign_owned_relations() {
        let catalog = MemoryCatalog::new();
        let t = catalog.add_relation("public", "t", RelationKind::BaseTable, UserId::new("alice"));
        let session = SessionContext::new(SessionUser::superuser("postgres"));

        let outcome = StatisticsCoordinator::default()
            .run(&catalog, &session, &select_from(&[t]))
            .unwrap();
        assert_eq!(outcome.report().unwrap().analyzed().count(), 1);
    }

    #[test]
    fn existing_statistics_are_left_alone() {
        let catalog = MemoryCatalog::new();
        let t = catalog.add_relation("public", "t", RelationKind::Partition, UserId::new("app"));
        catalog.set_statistics(t, 4);

        let outcome = StatisticsCoordinator::default()
            .run(&catalog, &owner_session(), &select_from(&[t]))
            .unwrap();
        assert!(matches!(
            outcome.report().unwrap().actions.as_slice(),
            [RelationAction::AlreadyHasStatistics { count: 4, .. }]
        ));
        assert!(catalog.maintenance_log().is_empty());
    }
}

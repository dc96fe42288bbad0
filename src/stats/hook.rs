use tracing::{debug, warn};

use crate::catalog::RelationCatalog;
use crate::config::{FailurePolicy, InterceptionPoint};
use crate::error::{HostError, StatsError};
use crate::parser::query_tree::QueryTree;
use crate::stats::coordinator::{AnalysisOutcome, StatisticsCoordinator};
use crate::stats::guard::SessionContext;

/// A statement as the host hands it to its interception chain.
#[derive(Debug, Clone, PartialEq)]
pub struct HostQuery {
    /// Original SQL text of the statement.
    pub source_text: String,
    /// The analyzed tree.
    pub tree: QueryTree,
}

impl HostQuery {
    /// Pair a statement's text with its analyzed tree.
    pub fn new(source_text: impl Into<String>, tree: QueryTree) -> Self {
        Self {
            source_text: source_text.into(),
            tree,
        }
    }
}

/// One link of the host's processing chain.
pub trait QueryHandler {
    /// Process `query` at `point`.
    fn handle(&mut self, point: InterceptionPoint, query: &HostQuery) -> Result<(), HostError>;
}

impl<H: QueryHandler + ?Sized> QueryHandler for &mut H {
    fn handle(&mut self, point: InterceptionPoint, query: &HostQuery) -> Result<(), HostError> {
        (**self).handle(point, query)
    }
}

/// Drive `handler` through both interception points the way the host does.
///
/// Every statement reaches [`InterceptionPoint::PostParseAnalyze`]; only
/// plannable statements go on to [`InterceptionPoint::ExecutorStart`].
pub fn process<H: QueryHandler + ?Sized>(
    handler: &mut H,
    query: &HostQuery,
) -> Result<(), HostError> {
    handler.handle(InterceptionPoint::PostParseAnalyze, query)?;
    if !query.tree.is_utility() {
        handler.handle(InterceptionPoint::ExecutorStart, query)?;
    }
    Ok(())
}

/// End of the chain: remembers what it was handed and does nothing else.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: Vec<(InterceptionPoint, String)>,
}

impl RecordingHandler {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(point, source_text)` received, in order.
    pub fn calls(&self) -> &[(InterceptionPoint, String)] {
        &self.calls
    }
}

impl QueryHandler for RecordingHandler {
    fn handle(&mut self, point: InterceptionPoint, query: &HostQuery) -> Result<(), HostError> {
        self.calls.push((point, query.source_text.clone()));
        Ok(())
    }
}

/// One analysis pass run by a [`StatisticsHook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    /// Statement that triggered the pass.
    pub statement: String,
    /// Point the pass ran at.
    pub point: InterceptionPoint,
    /// What the pass did, or why it failed.
    pub result: Result<AnalysisOutcome, StatsError>,
}

/// Installs the statistics pass in front of the previous handler.
///
/// At the configured interception point the pass runs first, then the
/// statement is forwarded to `next` unchanged whatever the pass returned.
/// At any other point the hook only forwards.
pub struct StatisticsHook<C: RelationCatalog, N: QueryHandler> {
    coordinator: StatisticsCoordinator,
    catalog: C,
    session: SessionContext,
    next: N,
    passes: Vec<PassRecord>,
}

impl<C: RelationCatalog, N: QueryHandler> StatisticsHook<C, N> {
    /// Chain a hook in front of `next`.
    pub fn new(
        coordinator: StatisticsCoordinator,
        catalog: C,
        session: SessionContext,
        next: N,
    ) -> Self {
        Self {
            coordinator,
            catalog,
            session,
            next,
            passes: Vec::new(),
        }
    }

    /// The catalog the pass reads from.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// The session state threaded through every pass.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// The previous handler.
    pub fn next(&self) -> &N {
        &self.next
    }

    /// Passes run so far.
    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    /// Remove and return the passes run so far.
    pub fn take_passes(&mut self) -> Vec<PassRecord> {
        std::mem::take(&mut self.passes)
    }
}

impl<C: RelationCatalog, N: QueryHandler> QueryHandler for StatisticsHook<C, N> {
    fn handle(&mut self, point: InterceptionPoint, query: &HostQuery) -> Result<(), HostError> {
        let config = self.coordinator.config();
        if point != config.interception_point {
            debug!(%point, "forwarding without analysis");
            return self.next.handle(point, query);
        }
        let failure_policy = config.failure_policy;

        let result = self
            .coordinator
            .run(&self.catalog, &self.session, &query.tree);
        let forwarded = self.next.handle(point, query);
        self.passes.push(PassRecord {
            statement: query.source_text.clone(),
            point,
            result: result.clone(),
        });

        let analysis_error = result.err();
        if let Err(host_error) = forwarded {
            if let Some(e) = analysis_error {
                warn!(error = %e, "statistics pass failed before host error");
            }
            return Err(host_error);
        }
        match (analysis_error, failure_policy) {
            (None, _) => Ok(()),
            (Some(e), FailurePolicy::Abort) => Err(HostError::Statistics(e)),
            (Some(e), FailurePolicy::Warn) => {
                warn!(error = %e, statement = %query.source_text, "statistics pass failed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryCatalog;
    use crate::catalog::{RelationKind, UserId};
    use crate::config::Config;
    use crate::parser::analyze::analyze_statement;
    use crate::parser::sql_parser::parse_statements;
    use crate::stats::guard::SessionUser;

    fn host_query(catalog: &MemoryCatalog, sql: &str) -> HostQuery {
        let statement = parse_statements(sql).unwrap().remove(0);
        HostQuery::new(sql, analyze_statement(&statement, catalog).unwrap())
    }

    fn hook(
        config: Config,
        catalog: MemoryCatalog,
    ) -> StatisticsHook<MemoryCatalog, RecordingHandler> {
        StatisticsHook::new(
            StatisticsCoordinator::new(config),
            catalog,
            SessionContext::new(SessionUser::new("app")),
            RecordingHandler::new(),
        )
    }

    fn catalog_with_t41() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.add_relation("public", "t41", RelationKind::BaseTable, UserId::new("app"));
        catalog
    }

    #[test]
    fn analysis_runs_once_at_the_configured_point() {
        let catalog = catalog_with_t41();
        let query = host_query(&catalog, "select * from t41");
        let mut hook = hook(Config::default(), catalog);

        process(&mut hook, &query).unwrap();
        assert_eq!(hook.passes().len(), 1);
        assert_eq!(hook.passes()[0].point, InterceptionPoint::PostParseAnalyze);
        assert_eq!(
            hook.next().calls(),
            &[
                (InterceptionPoint::PostParseAnalyze, "select * from t41".to_string()),
                (InterceptionPoint::ExecutorStart, "select * from t41".to_string()),
            ]
        );
        assert_eq!(hook.catalog().maintenance_log(), vec!["public.t41".to_string()]);
    }

    #[test]
    fn executor_start_never_sees_utility_statements() {
        let catalog = catalog_with_t41();
        let query = host_query(&catalog, "set work_mem = '64MB'");
        let config = Config {
            interception_point: InterceptionPoint::ExecutorStart,
            ..Config::default()
        };
        let mut hook = hook(config, catalog);

        process(&mut hook, &query).unwrap();
        assert!(hook.passes().is_empty());
        assert_eq!(hook.next().calls().len(), 1);
    }

    #[test]
    fn abort_policy_surfaces_error_after_forwarding() {
        let catalog = catalog_with_t41();
        catalog.fail_maintenance_for("public.t41");
        let query = host_query(&catalog, "select * from t41");
        let mut hook = hook(Config::default(), catalog);

        let err = process(&mut hook, &query).expect_err("abort policy");
        assert!(matches!(err, HostError::Statistics(StatsError::Maintenance { .. })));
        assert_eq!(hook.next().calls().len(), 1);
        assert!(!hook.session().guard().is_active());
    }

    #[test]
    fn warn_policy_lets_the_statement_through() {
        let catalog = catalog_with_t41();
        catalog.fail_maintenance_for("public.t41");
        let query = host_query(&catalog, "select * from t41");
        let config = Config {
            failure_policy: FailurePolicy::Warn,
            ..Config::default()
        };
        let mut hook = hook(config, catalog);

        process(&mut hook, &query).unwrap();
        assert_eq!(hook.next().calls().len(), 2);
        assert!(hook.passes()[0].result.is_err());
    }
}

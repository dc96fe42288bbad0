use std::fmt::Write;

use crate::stats::coordinator::{AnalysisOutcome, AnalysisReport, RelationAction};
use crate::stats::hook::PassRecord;

/// Build a markdown report with one section per analysis pass and a summary table.
pub fn build_report(passes: &[PassRecord]) -> String {
    let mut report = String::new();

    writeln!(report, "# jit-stats Analysis Report").unwrap();
    writeln!(report).unwrap();

    // Summary
    let summary = Summary::from_passes(passes);
    writeln!(report, "## Summary").unwrap();
    writeln!(report).unwrap();
    writeln!(report, "| Passes | Skipped | Failed | Analyzed | Up to date | Denied | Excluded |").unwrap();
    writeln!(report, "|--------|---------|--------|----------|------------|--------|----------|").unwrap();
    writeln!(
        report,
        "| {} | {} | {} | {} | {} | {} | {} |",
        passes.len(),
        summary.skipped,
        summary.failed,
        summary.analyzed,
        summary.up_to_date,
        summary.denied,
        summary.excluded
    )
    .unwrap();

    for (index, pass) in passes.iter().enumerate() {
        writeln!(report).unwrap();
        writeln!(report, "## Statement {}", index + 1).unwrap();
        writeln!(report).unwrap();
        writeln!(report, "```sql").unwrap();
        writeln!(report, "{}", pass.statement.trim()).unwrap();
        writeln!(report, "```").unwrap();
        writeln!(report).unwrap();
        writeln!(report, "Interception point: `{}`", pass.point).unwrap();
        writeln!(report).unwrap();

        match &pass.result {
            Ok(AnalysisOutcome::Skipped) => {
                writeln!(report, "Skipped: an analysis pass was already active.").unwrap();
            }
            Ok(AnalysisOutcome::Completed(completed)) => write_pass(&mut report, completed),
            Err(e) => {
                writeln!(report, "**FAILED**: {e}").unwrap();
            }
        }
    }

    report
}

fn write_pass(report: &mut String, pass: &AnalysisReport) {
    writeln!(
        report,
        "Referenced relations: {}, storage-backed targets: {}",
        pass.referenced.len(),
        pass.targets.len()
    )
    .unwrap();

    if pass.actions.is_empty() {
        return;
    }
    writeln!(report).unwrap();
    writeln!(report, "| Relation | Kind | Owner | Action |").unwrap();
    writeln!(report, "|----------|------|-------|--------|").unwrap();
    for action in &pass.actions {
        let relation = action.relation();
        writeln!(
            report,
            "| {} | {} | {} | {} |",
            relation.qualified_name(),
            relation.kind,
            relation.owner,
            format_action(action)
        )
        .unwrap();
    }
}

fn format_action(action: &RelationAction) -> String {
    match action {
        RelationAction::AlreadyHasStatistics { count, .. } => {
            format!("{} ({count} entries)", action.label())
        }
        _ => action.label().to_string(),
    }
}

#[derive(Default)]
struct Summary {
    skipped: usize,
    failed: usize,
    analyzed: usize,
    up_to_date: usize,
    denied: usize,
    excluded: usize,
}

impl Summary {
    fn from_passes(passes: &[PassRecord]) -> Self {
        let mut summary = Summary::default();
        for pass in passes {
            match &pass.result {
                Ok(AnalysisOutcome::Skipped) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
                Ok(AnalysisOutcome::Completed(report)) => {
                    for action in &report.actions {
                        match action {
                            RelationAction::Analyzed(_) => summary.analyzed += 1,
                            RelationAction::AlreadyHasStatistics { .. } => summary.up_to_date += 1,
                            RelationAction::Denied(_) => summary.denied += 1,
                            RelationAction::Excluded(_) => summary.excluded += 1,
                        }
                    }
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RelationId, RelationKind, RelationRecord, UserId};
    use crate::config::InterceptionPoint;
    use crate::error::StatsError;
    use crate::stats::relation_set::RelationSet;

    fn record(name: &str) -> RelationRecord {
        RelationRecord {
            id: RelationId(16384),
            schema: "public".to_string(),
            name: name.to_string(),
            kind: RelationKind::BaseTable,
            owner: UserId::new("app"),
        }
    }

    #[test]
    fn report_lists_actions_and_failures() {
        let targets: RelationSet = [RelationId(16384)].into_iter().collect();
        let passes = vec![
            PassRecord {
                statement: "select * from t41".to_string(),
                point: InterceptionPoint::PostParseAnalyze,
                result: Ok(AnalysisOutcome::Completed(AnalysisReport {
                    referenced: targets.clone(),
                    targets,
                    actions: vec![RelationAction::AlreadyHasStatistics {
                        relation: record("t41"),
                        count: 3,
                    }],
                })),
            },
            PassRecord {
                statement: "select * from t42".to_string(),
                point: InterceptionPoint::PostParseAnalyze,
                result: Err(StatsError::Maintenance {
                    relation: "public.t42".to_string(),
                    reason: "disk full".to_string(),
                }),
            },
        ];

        let report = build_report(&passes);
        assert!(report.contains("| 2 | 0 | 1 | 0 | 1 | 0 | 0 |"), "{report}");
        assert!(report.contains("| public.t41 | table | app | has statistics (3 entries) |"));
        assert!(report.contains("**FAILED**: cannot run analyze for public.t42: disk full"));
    }
}

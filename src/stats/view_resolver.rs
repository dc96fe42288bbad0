use std::collections::VecDeque;

use tracing::debug;

use crate::catalog::{RelationCatalog, RelationId, RelationKind};
use crate::error::StatsError;
use crate::stats::relation_set::RelationSet;

/// Expands views into the storage-backed relations they ultimately read.
pub struct ViewDependencyResolver<'c, C: RelationCatalog + ?Sized> {
    catalog: &'c C,
}

impl<'c, C: RelationCatalog + ?Sized> ViewDependencyResolver<'c, C> {
    /// Resolver reading dependency edges from `catalog`.
    pub fn new(catalog: &'c C) -> Self {
        Self { catalog }
    }

    /// Base tables and partitions reachable from `view` through any chain of views.
    ///
    /// Each view is expanded at most once per call, so shared sub-views and
    /// cyclic definitions terminate. A dependency of kind
    /// [`RelationKind::Other`] aborts the expansion: skipping it would make
    /// the relation look like it needs no statistics.
    pub fn expand(&self, view: RelationId) -> Result<RelationSet, StatsError> {
        let mut bases = RelationSet::new();
        let mut expanded = RelationSet::new();
        expanded.insert(view);
        let mut pending = VecDeque::from([view]);

        while let Some(current) = pending.pop_front() {
            let dependencies = self
                .catalog
                .view_dependencies(current)
                .map_err(|source| StatsError::CatalogInconsistency {
                    id: current,
                    source,
                })?;

            for dependency in dependencies {
                match dependency.kind {
                    kind if kind.is_storage_backed() => {
                        if bases.insert(dependency.id) {
                            debug!(view = %current, base = %dependency.id, "view reads base relation");
                        }
                    }
                    RelationKind::View => {
                        if expanded.insert(dependency.id) {
                            pending.push_back(dependency.id);
                        } else {
                            debug!(view = %dependency.id, "view already expanded");
                        }
                    }
                    _ => {
                        return Err(StatsError::UnexpectedKind {
                            id: dependency.id,
                            name: dependency.qualified_name(),
                            kind: dependency.kind,
                        });
                    }
                }
            }
        }

        Ok(bases)
    }
}

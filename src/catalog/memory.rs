use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use sqlparser::ast::{AlterTableOperation, Owner, Statement};
use tracing::debug;

use crate::catalog::{
    RelationCatalog, RelationId, RelationKind, RelationRecord, RelationResolver, UserId,
};
use crate::error::CatalogError;
use crate::parser::analyze::analyze_statement;
use crate::parser::names::{fold_ident, object_name_parts, split_schema_and_relation};
use crate::parser::sql_parser::parse_statements;
use crate::stats::walker;

/// First id handed out; lower ids are reserved for built-in objects in `PostgreSQL`.
const FIRST_USER_ID: u32 = 16384;

/// Catalog held entirely in memory.
///
/// Relations, view edges and statistics counters live behind a `RefCell`, so
/// the catalog can be shared by reference with the statistics core while
/// maintenance still updates it. Not `Sync`: one instance serves one session.
#[derive(Debug)]
pub struct MemoryCatalog {
    state: RefCell<CatalogState>,
}

#[derive(Debug)]
struct CatalogState {
    next_id: u32,
    search_path: Vec<String>,
    relations: BTreeMap<RelationId, MemoryRelation>,
    by_name: HashMap<(String, String), RelationId>,
    view_edges: HashMap<RelationId, Vec<RelationId>>,
    failing_maintenance: HashSet<String>,
    maintenance_log: Vec<String>,
    view_dependency_calls: HashMap<RelationId, usize>,
}

#[derive(Debug, Clone)]
struct MemoryRelation {
    record: RelationRecord,
    statistics: u64,
}

impl MemoryCatalog {
    /// Create an empty catalog with `search_path = public`.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(CatalogState {
                next_id: FIRST_USER_ID,
                search_path: vec!["public".to_string()],
                relations: BTreeMap::new(),
                by_name: HashMap::new(),
                view_edges: HashMap::new(),
                failing_maintenance: HashSet::new(),
                maintenance_log: Vec::new(),
                view_dependency_calls: HashMap::new(),
            }),
        }
    }

    /// Build a catalog from a DDL script.
    ///
    /// `CREATE TABLE` and `CREATE MATERIALIZED VIEW` add base tables, `CREATE VIEW`
    /// adds a view whose dependencies are the relations its body references,
    /// `CREATE SEQUENCE` adds an [`RelationKind::Other`] relation and
    /// `ALTER TABLE ... OWNER TO` changes ownership. Everything else is ignored.
    pub fn from_ddl(sql: &str, owner: &UserId) -> Result<Self, String> {
        let catalog = Self::new();
        for statement in parse_statements(sql)? {
            catalog.apply_ddl(&statement, owner)?;
        }
        Ok(catalog)
    }

    /// Apply one DDL statement the way [`MemoryCatalog::from_ddl`] does.
    pub fn apply_ddl(&self, statement: &Statement, owner: &UserId) -> Result<(), String> {
        match statement {
            Statement::CreateTable(create) => {
                let (schema, name) = object_name_parts(&create.name);
                self.add_relation(
                    &self.schema_or_default(schema),
                    &name,
                    RelationKind::BaseTable,
                    owner.clone(),
                );
            }
            Statement::CreateView {
                name,
                query,
                materialized,
                ..
            } => {
                let (schema, name) = object_name_parts(name);
                let schema = self.schema_or_default(schema);
                if *materialized {
                    self.add_relation(&schema, &name, RelationKind::BaseTable, owner.clone());
                    return Ok(());
                }
                let body = Statement::Query(query.clone());
                let tree = analyze_statement(&body, self)
                    .map_err(|e| format!("view {schema}.{name}: {e}"))?;
                let dependencies: Vec<RelationId> = walker::discover(&tree).iter().collect();
                self.add_view(&schema, &name, owner.clone(), &dependencies);
            }
            Statement::CreateSequence { name, .. } => {
                let (schema, name) = object_name_parts(name);
                self.add_relation(
                    &self.schema_or_default(schema),
                    &name,
                    RelationKind::Other,
                    owner.clone(),
                );
            }
            Statement::AlterTable {
                name, operations, ..
            } => {
                let (schema, relation) = object_name_parts(name);
                for operation in operations {
                    let AlterTableOperation::OwnerTo { new_owner } = operation else {
                        continue;
                    };
                    let Owner::Ident(role) = new_owner else {
                        continue;
                    };
                    let id = self
                        .resolve(schema.as_deref(), &relation)
                        .ok()
                        .flatten()
                        .ok_or_else(|| format!("relation \"{relation}\" does not exist"))?;
                    self.set_owner(id, UserId::new(fold_ident(role)));
                }
            }
            other => debug!(statement = %other, "ignoring DDL statement"),
        }
        Ok(())
    }

    fn schema_or_default(&self, schema: Option<String>) -> String {
        schema.unwrap_or_else(|| {
            self.state
                .borrow()
                .search_path
                .first()
                .cloned()
                .unwrap_or_else(|| "public".to_string())
        })
    }

    /// Add a relation and return its freshly assigned id.
    pub fn add_relation(
        &self,
        schema: &str,
        name: &str,
        kind: RelationKind,
        owner: UserId,
    ) -> RelationId {
        let mut state = self.state.borrow_mut();
        let id = RelationId(state.next_id);
        state.next_id += 1;
        state.relations.insert(
            id,
            MemoryRelation {
                record: RelationRecord {
                    id,
                    schema: schema.to_string(),
                    name: name.to_string(),
                    kind,
                    owner,
                },
                statistics: 0,
            },
        );
        state
            .by_name
            .insert((schema.to_string(), name.to_string()), id);
        id
    }

    /// Add a view reading `dependencies` directly.
    pub fn add_view(
        &self,
        schema: &str,
        name: &str,
        owner: UserId,
        dependencies: &[RelationId],
    ) -> RelationId {
        let id = self.add_relation(schema, name, RelationKind::View, owner);
        self.set_view_dependencies(id, dependencies);
        id
    }

    /// Replace the direct dependency edges of `view`.
    pub fn set_view_dependencies(&self, view: RelationId, dependencies: &[RelationId]) {
        self.state
            .borrow_mut()
            .view_edges
            .insert(view, dependencies.to_vec());
    }

    /// Overwrite the statistics entry count of a relation.
    pub fn set_statistics(&self, id: RelationId, count: u64) {
        if let Some(relation) = self.state.borrow_mut().relations.get_mut(&id) {
            relation.statistics = count;
        }
    }

    /// Change the owner of a relation.
    pub fn set_owner(&self, id: RelationId, owner: UserId) {
        if let Some(relation) = self.state.borrow_mut().relations.get_mut(&id) {
            relation.record.owner = owner;
        }
    }

    /// Make maintenance of `relation_name` (as passed to [`RelationCatalog::run_maintenance`]) fail.
    pub fn fail_maintenance_for(&self, relation_name: &str) {
        self.state
            .borrow_mut()
            .failing_maintenance
            .insert(relation_name.to_string());
    }

    /// Relation names maintenance ran for, in call order.
    pub fn maintenance_log(&self) -> Vec<String> {
        self.state.borrow().maintenance_log.clone()
    }

    /// How many times [`RelationCatalog::view_dependencies`] was asked about `id`.
    pub fn view_dependency_calls(&self, id: RelationId) -> usize {
        self.state
            .borrow()
            .view_dependency_calls
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Id of a relation by schema and name, if present.
    pub fn relation_id(&self, schema: &str, name: &str) -> Option<RelationId> {
        self.state
            .borrow()
            .by_name
            .get(&(schema.to_string(), name.to_string()))
            .copied()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationResolver for MemoryCatalog {
    fn resolve(&self, schema: Option<&str>, name: &str) -> Result<Option<RelationId>, CatalogError> {
        let state = self.state.borrow();
        let found = match schema {
            Some(schema) => state
                .by_name
                .get(&(schema.to_string(), name.to_string()))
                .copied(),
            None => state.search_path.iter().find_map(|schema| {
                state
                    .by_name
                    .get(&(schema.clone(), name.to_string()))
                    .copied()
            }),
        };
        Ok(found)
    }
}

impl RelationCatalog for MemoryCatalog {
    fn lookup(&self, id: RelationId) -> Result<RelationRecord, CatalogError> {
        self.state
            .borrow()
            .relations
            .get(&id)
            .map(|relation| relation.record.clone())
            .ok_or(CatalogError::NotFound(id))
    }

    fn view_dependencies(&self, id: RelationId) -> Result<Vec<RelationRecord>, CatalogError> {
        let mut state = self.state.borrow_mut();
        *state.view_dependency_calls.entry(id).or_insert(0) += 1;
        if !state.relations.contains_key(&id) {
            return Err(CatalogError::NotFound(id));
        }
        let edges = state.view_edges.get(&id).cloned().unwrap_or_default();
        edges
            .into_iter()
            .map(|dep| {
                state
                    .relations
                    .get(&dep)
                    .map(|relation| relation.record.clone())
                    .ok_or(CatalogError::NotFound(dep))
            })
            .collect()
    }

    fn statistics_count(&self, id: RelationId) -> Result<u64, CatalogError> {
        self.state
            .borrow()
            .relations
            .get(&id)
            .map(|relation| relation.statistics)
            .ok_or(CatalogError::NotFound(id))
    }

    fn run_maintenance(&self, relation_name: &str) -> Result<(), CatalogError> {
        let (schema, name) = split_schema_and_relation(relation_name);
        let id = self
            .resolve(schema.as_deref(), &name)?
            .ok_or_else(|| {
                CatalogError::Backend(format!("relation \"{relation_name}\" does not exist"))
            })?;

        let mut state = self.state.borrow_mut();
        state.maintenance_log.push(relation_name.to_string());
        if state.failing_maintenance.contains(relation_name) {
            return Err(CatalogError::Backend(format!(
                "analyze of {relation_name} failed"
            )));
        }
        if let Some(relation) = state.relations.get_mut(&id) {
            relation.statistics = relation.statistics.max(1);
        }
        Ok(())
    }
}

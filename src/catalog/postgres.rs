use std::cell::RefCell;

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Oid, Text};
use tracing::{debug, info};

use crate::catalog::{
    RelationCatalog, RelationId, RelationKind, RelationRecord, RelationResolver, UserId,
};
use crate::error::CatalogError;
use crate::parser::names::quote_identifier;
use crate::stats::guard::SessionUser;

const RELATION_COLUMNS: &str = "c.oid AS relid, \
     n.nspname::text AS schema_name, \
     c.relname::text AS relation_name, \
     c.relkind::text AS relkind, \
     pg_get_userbyid(c.relowner)::text AS owner";

#[derive(QueryableByName)]
struct RelationRow {
    #[diesel(sql_type = Oid)]
    relid: u32,
    #[diesel(sql_type = Text)]
    schema_name: String,
    #[diesel(sql_type = Text)]
    relation_name: String,
    #[diesel(sql_type = Text)]
    relkind: String,
    #[diesel(sql_type = Text)]
    owner: String,
}

impl From<RelationRow> for RelationRecord {
    fn from(row: RelationRow) -> Self {
        RelationRecord {
            id: RelationId(row.relid),
            schema: row.schema_name,
            name: row.relation_name,
            kind: RelationKind::from_relkind(&row.relkind),
            owner: UserId::new(row.owner),
        }
    }
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct RegclassRow {
    #[diesel(sql_type = Nullable<Oid>)]
    relid: Option<u32>,
}

#[derive(QueryableByName)]
struct SessionRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Bool)]
    superuser: bool,
}

fn backend(error: impl std::fmt::Display) -> CatalogError {
    CatalogError::Backend(error.to_string())
}

/// Catalog reading the system tables of a live `PostgreSQL` server.
///
/// One connection, used by one session; every call reads the catalog afresh.
pub struct PgCatalog {
    conn: RefCell<PgConnection>,
    verbose_analyze: bool,
}

impl PgCatalog {
    /// Connect to `database_url`.
    pub fn connect(database_url: &str) -> Result<Self, CatalogError> {
        let conn = PgConnection::establish(database_url).map_err(backend)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already established connection.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self {
            conn: RefCell::new(conn),
            verbose_analyze: false,
        }
    }

    /// Use `ANALYZE VERBOSE` for maintenance.
    pub fn with_verbose_analyze(mut self, verbose: bool) -> Self {
        self.verbose_analyze = verbose;
        self
    }

    /// The role the connection runs as.
    pub fn session_user(&self) -> Result<SessionUser, CatalogError> {
        let row: SessionRow = diesel::sql_query(
            "SELECT current_user::text AS name, r.rolsuper AS superuser \
             FROM pg_roles r WHERE r.rolname = current_user",
        )
        .get_result(&mut *self.conn.borrow_mut())
        .map_err(backend)?;
        Ok(SessionUser {
            name: UserId::new(row.name),
            superuser: row.superuser,
        })
    }

    /// Run `sql` on the connection, discarding any result.
    pub fn execute(&self, sql: &str) -> Result<(), CatalogError> {
        self.conn.borrow_mut().batch_execute(sql).map_err(backend)
    }
}

impl RelationResolver for PgCatalog {
    fn resolve(&self, schema: Option<&str>, name: &str) -> Result<Option<RelationId>, CatalogError> {
        let qualified = match schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(name)),
            None => quote_identifier(name),
        };
        let row: RegclassRow = diesel::sql_query("SELECT to_regclass($1)::oid AS relid")
            .bind::<Text, _>(qualified.as_str())
            .get_result(&mut *self.conn.borrow_mut())
            .map_err(backend)?;
        Ok(row.relid.map(RelationId))
    }
}

impl RelationCatalog for PgCatalog {
    fn lookup(&self, id: RelationId) -> Result<RelationRecord, CatalogError> {
        let mut rows: Vec<RelationRow> = diesel::sql_query(format!(
            "SELECT {RELATION_COLUMNS} \
             FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.oid = $1"
        ))
        .bind::<Oid, _>(id.0)
        .load(&mut *self.conn.borrow_mut())
        .map_err(backend)?;

        match rows.len() {
            0 => Err(CatalogError::NotFound(id)),
            1 => Ok(rows.remove(0).into()),
            count => Err(CatalogError::Ambiguous { id, count }),
        }
    }

    fn view_dependencies(&self, id: RelationId) -> Result<Vec<RelationRecord>, CatalogError> {
        let rows: Vec<RelationRow> = diesel::sql_query(format!(
            "SELECT DISTINCT {RELATION_COLUMNS} \
             FROM pg_rewrite r \
             JOIN pg_depend d ON d.classid = 'pg_rewrite'::regclass \
                 AND d.objid = r.oid \
                 AND d.refclassid = 'pg_class'::regclass \
             JOIN pg_class c ON c.oid = d.refobjid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE r.ev_class = $1 AND d.refobjid <> $1 \
             ORDER BY relid"
        ))
        .bind::<Oid, _>(id.0)
        .load(&mut *self.conn.borrow_mut())
        .map_err(backend)?;

        debug!(view = %id, dependencies = rows.len(), "read view dependencies");
        Ok(rows.into_iter().map(RelationRecord::from).collect())
    }

    fn statistics_count(&self, id: RelationId) -> Result<u64, CatalogError> {
        // Owners can read pg_stats; pg_statistic needs superuser.
        let row: CountRow = diesel::sql_query(
            "SELECT count(*) AS count \
             FROM pg_stats s \
             JOIN pg_class c ON c.relname = s.tablename \
             JOIN pg_namespace n ON n.oid = c.relnamespace AND n.nspname = s.schemaname \
             WHERE c.oid = $1",
        )
        .bind::<Oid, _>(id.0)
        .get_result(&mut *self.conn.borrow_mut())
        .map_err(backend)?;
        Ok(u64::try_from(row.count).unwrap_or(0))
    }

    fn run_maintenance(&self, relation_name: &str) -> Result<(), CatalogError> {
        let command = if self.verbose_analyze {
            format!("ANALYZE VERBOSE {relation_name}")
        } else {
            format!("ANALYZE {relation_name}")
        };
        info!(%command, "running maintenance");
        self.execute(&command)
    }
}

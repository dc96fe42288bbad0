//! CLI entry point for `jit-stats`.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use jit_stats::catalog::memory::MemoryCatalog;
use jit_stats::catalog::{RelationCatalog, UserId};
use jit_stats::config::{Config, FailurePolicy, InterceptionPoint};
use jit_stats::output::{formatter, report};
use jit_stats::parser::analyze::analyze_statement;
use jit_stats::parser::sql_parser;
use jit_stats::stats::coordinator::StatisticsCoordinator;
use jit_stats::stats::guard::{SessionContext, SessionUser};
use jit_stats::stats::hook::{self, HostQuery, QueryHandler, RecordingHandler, StatisticsHook};
use sqlparser::ast::Statement;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "jit-stats",
    about = "Analyze tables that have no planner statistics before queries read them"
)]
struct Cli {
    /// SQL files holding the statements to run
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// DDL script describing the schema, loaded into an in-memory catalog
    #[arg(long, required_unless_present = "db_url", conflicts_with = "db_url")]
    schema: Option<PathBuf>,

    /// Run against a live `PostgreSQL` database (needs the `db` feature)
    #[arg(long)]
    db_url: Option<String>,

    /// Session user; also owns every relation the schema script creates
    #[arg(long, default_value = "postgres")]
    user: String,

    /// Treat the session user as a superuser
    #[arg(long)]
    superuser: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured interception point
    #[arg(long)]
    interception_point: Option<InterceptionPoint>,

    /// Override the configured failure policy
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Write the report to this directory instead of stdout
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print verbose diagnostics
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };
    debug!(?config, "effective configuration");

    let mut combined_sql = String::new();
    for path in &cli.input {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                combined_sql.push_str(&content);
                combined_sql.push('\n');
            }
            Err(e) => {
                eprintln!("Error reading {}: {e}", path.display());
                process::exit(2);
            }
        }
    }
    let statements = match sql_parser::parse_statements(&combined_sql) {
        Ok(statements) => statements,
        Err(e) => {
            eprintln!("SQL parse error: {e}");
            process::exit(2);
        }
    };

    let coordinator = StatisticsCoordinator::new(config);
    let run = match (&cli.schema, &cli.db_url) {
        (Some(schema), _) => run_in_memory(&cli, schema, coordinator, &statements),
        (None, Some(url)) => run_live(&cli, url, coordinator, &statements),
        (None, None) => Err("Either --schema or --db-url is required".to_string()),
    };
    let RunSummary {
        passes,
        failed,
        rejected,
    } = match run {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    match &cli.output_dir {
        Some(dir) => {
            let name = cli
                .input
                .first()
                .and_then(|p| p.file_stem())
                .and_then(|s| s.to_str())
                .unwrap_or("queries");
            if let Err(e) = formatter::write_output(dir, name, &passes) {
                eprintln!("Error writing output: {e}");
                process::exit(2);
            }
        }
        None => print!("{}", report::build_report(&passes)),
    }

    if rejected > 0 {
        process::exit(2);
    }
    if failed {
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "jit_stats=debug"
    } else {
        "jit_stats=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    if let Some(point) = cli.interception_point {
        config.interception_point = point;
    }
    if let Some(policy) = cli.failure_policy {
        config.failure_policy = policy;
    }
    Ok(config)
}

fn session_user(cli: &Cli) -> SessionUser {
    SessionUser {
        name: UserId::new(&cli.user),
        superuser: cli.superuser,
    }
}

/// Passes recorded over a run, plus whether any of them failed and how many
/// statements were rejected before reaching the chain.
struct RunSummary {
    passes: Vec<hook::PassRecord>,
    failed: bool,
    rejected: usize,
}

type RunResult = Result<RunSummary, String>;

fn run_in_memory(
    cli: &Cli,
    schema: &Path,
    coordinator: StatisticsCoordinator,
    statements: &[Statement],
) -> RunResult {
    let ddl = std::fs::read_to_string(schema)
        .map_err(|e| format!("Error reading {}: {e}", schema.display()))?;
    let catalog = MemoryCatalog::from_ddl(&ddl, &UserId::new(&cli.user))
        .map_err(|e| format!("Schema error: {e}"))?;

    let owner = UserId::new(&cli.user);
    let mut chain = StatisticsHook::new(
        coordinator,
        catalog,
        SessionContext::new(session_user(cli)),
        RecordingHandler::new(),
    );
    // Relations created by the input become visible to later statements.
    Ok(run_statements(&mut chain, statements, |catalog, statement| {
        catalog.apply_ddl(statement, &owner)
    }))
}

#[cfg(feature = "db")]
fn run_live(
    cli: &Cli,
    url: &str,
    coordinator: StatisticsCoordinator,
    statements: &[Statement],
) -> RunResult {
    use jit_stats::catalog::postgres::PgCatalog;

    let verbose_analyze = coordinator.config().verbose_analyze;
    let catalog = PgCatalog::connect(url)
        .map_err(|e| format!("Error connecting to database: {e}"))?
        .with_verbose_analyze(verbose_analyze);
    let mut user = catalog
        .session_user()
        .map_err(|e| format!("Error reading session user: {e}"))?;
    if cli.superuser {
        user.superuser = true;
    }

    let mut chain = StatisticsHook::new(
        coordinator,
        &catalog,
        SessionContext::new(user),
        ExecutingHandler { catalog: &catalog },
    );
    Ok(run_statements(&mut chain, statements, |_, _| Ok(())))
}

#[cfg(not(feature = "db"))]
fn run_live(
    _cli: &Cli,
    _url: &str,
    _coordinator: StatisticsCoordinator,
    _statements: &[Statement],
) -> RunResult {
    Err("--db-url needs jit-stats built with the `db` feature".to_string())
}

/// End of the chain against a live database: runs each statement once.
#[cfg(feature = "db")]
struct ExecutingHandler<'c> {
    catalog: &'c jit_stats::catalog::postgres::PgCatalog,
}

#[cfg(feature = "db")]
impl QueryHandler for ExecutingHandler<'_> {
    fn handle(
        &mut self,
        point: InterceptionPoint,
        query: &HostQuery,
    ) -> Result<(), jit_stats::error::HostError> {
        let runs_here = match point {
            InterceptionPoint::ExecutorStart => true,
            InterceptionPoint::PostParseAnalyze => query.tree.is_utility(),
        };
        if !runs_here {
            return Ok(());
        }
        self.catalog
            .execute(&query.source_text)
            .map_err(|e| jit_stats::error::HostError::Execution(e.to_string()))
    }
}

/// Feed every statement through the chain.
///
/// A statement that fails parse-analysis is reported and counted as rejected;
/// the remaining statements still run. `apply_utility` sees each utility
/// statement after the chain has handled it.
fn run_statements<C: RelationCatalog, N: QueryHandler>(
    chain: &mut StatisticsHook<C, N>,
    statements: &[Statement],
    mut apply_utility: impl FnMut(&C, &Statement) -> Result<(), String>,
) -> RunSummary {
    let mut failed = false;
    let mut rejected = 0;
    for statement in statements {
        let tree = match analyze_statement(statement, chain.catalog()) {
            Ok(tree) => tree,
            Err(e) => {
                eprintln!("Error analyzing `{statement}`: {e}");
                rejected += 1;
                continue;
            }
        };
        let query = HostQuery::new(statement.to_string(), tree);
        if let Err(e) = hook::process(chain, &query) {
            eprintln!("Error in `{}`: {e}", query.source_text);
            failed = true;
        }
        if query.tree.is_utility() {
            if let Err(e) = apply_utility(chain.catalog(), statement) {
                eprintln!("Error applying `{statement}`: {e}");
                rejected += 1;
            }
        }
    }
    RunSummary {
        passes: chain.take_passes(),
        failed,
        rejected,
    }
}

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}_{nanos}"));
    std::fs::create_dir_all(&dir).expect("should create temp dir");
    dir
}

fn jit_stats() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_jit-stats"));
    command.env_remove("RUST_LOG");
    command
}

#[test]
fn cli_prints_report_for_fixture_queries() {
    let output = jit_stats()
        .arg("tests/fixtures/scenarios/queries.sql")
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .arg("--user")
        .arg("app")
        .output()
        .expect("should run jit-stats binary");

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("# jit-stats Analysis Report"));
    assert!(stdout.contains("| public.t41 | table | app | analyzed |"));
    assert!(stdout.contains("| public.t500 | table | alice | denied |"));
}

#[test]
fn cli_exits_one_when_a_pass_fails() {
    let output = jit_stats()
        .arg("tests/fixtures/scenarios/failing.sql")
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .arg("--user")
        .arg("app")
        .output()
        .expect("should run jit-stats binary");

    assert_eq!(
        output.status.code(),
        Some(1),
        "expected exit code 1 for a failed pass, got {output:?}"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("**FAILED**"));
    // The statement after the failure still ran its own pass.
    assert!(stdout.contains("| public.t41 | table | app | analyzed |"));
}

#[test]
fn cli_config_file_can_downgrade_failures_to_warnings() {
    let status = jit_stats()
        .arg("tests/fixtures/scenarios/failing.sql")
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .arg("--config")
        .arg("tests/fixtures/scenarios/config.json")
        .status()
        .expect("should run jit-stats binary");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn cli_writes_report_to_output_dir() {
    let temp = unique_temp_dir("jit_stats_cli_out");
    let status = jit_stats()
        .arg("tests/fixtures/scenarios/queries.sql")
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .arg("--user")
        .arg("app")
        .arg("--output-dir")
        .arg(&temp)
        .status()
        .expect("should run jit-stats binary");
    assert_eq!(status.code(), Some(0));

    let report_path = temp.join("queries_report.md");
    let report = std::fs::read_to_string(&report_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", report_path.display()));
    assert!(report.contains("## Statement 4"));
}

#[test]
fn cli_sees_tables_created_earlier_in_the_input_and_keeps_going_after_bad_statements() {
    let temp = unique_temp_dir("jit_stats_cli_ddl");
    let queries = temp.join("mixed.sql");
    std::fs::write(
        &queries,
        "create table t43 (a int);\n\
         select * from t43;\n\
         select * from no_such_table;\n\
         select * from t41;\n",
    )
    .expect("should write temp sql");

    let output = jit_stats()
        .arg(&queries)
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .arg("--user")
        .arg("app")
        .output()
        .expect("should run jit-stats binary");

    assert_eq!(output.status.code(), Some(2), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("no_such_table"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("| public.t43 | table | app | analyzed |"), "{stdout}");
    assert!(stdout.contains("| public.t41 | table | app | analyzed |"), "{stdout}");
}

#[test]
fn cli_reports_input_errors_with_exit_code_two() {
    let missing = jit_stats()
        .arg("tests/fixtures/scenarios/does_not_exist.sql")
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .status()
        .expect("should run jit-stats binary");
    assert_eq!(missing.code(), Some(2));

    let temp = unique_temp_dir("jit_stats_cli_unknown");
    let queries = temp.join("unknown.sql");
    std::fs::write(&queries, "select * from no_such_table;").expect("should write temp sql");
    let unknown = jit_stats()
        .arg(&queries)
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .output()
        .expect("should run jit-stats binary");
    assert_eq!(unknown.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("no_such_table"));

    let bad_point = jit_stats()
        .arg("tests/fixtures/scenarios/queries.sql")
        .arg("--schema")
        .arg("tests/fixtures/scenarios/schema.sql")
        .arg("--interception-point")
        .arg("planner")
        .status()
        .expect("should run jit-stats binary");
    assert_eq!(bad_point.code(), Some(2));
}

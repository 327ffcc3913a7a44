// parity/tests/cli_tests.rs

use anyhow::Result;
use assert_cmd::prelude::*;
use duckdb::Connection;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const SETTINGS: &str = r#"
name: billing
stores:
  source: { path: source.duckdb }
  target: { path: target.duckdb }
retry:
  max_retries: 0
  delay_ms: 1
"#;

const RULES: &str = r#"
rules:
  - rule_id: CNT-001
    check_kind: count
    source: { store: source, table: orders }
    target: orders
  - rule_id: NUL-001
    check_kind: "null"
    table: orders
    column: customer_id
"#;

/// A throwaway project: settings, rules and two DuckDB files.
struct ParityTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl ParityTestEnv {
    fn new(target_rows: u32) -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();

        Self::seed(&root.join("source.duckdb"), 10)?;
        Self::seed(&root.join("target.duckdb"), target_rows)?;
        fs::write(root.join("parity.yaml"), SETTINGS)?;
        fs::create_dir_all(root.join("rules"))?;
        fs::write(root.join("rules/orders.yml"), RULES)?;

        Ok(Self { _tmp: tmp, root })
    }

    fn seed(path: &PathBuf, rows: u32) -> Result<()> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "CREATE TABLE orders AS SELECT range AS id, range % 3 AS customer_id FROM range(0, {rows});"
        ))?;
        Ok(())
    }

    fn parity(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("parity"));
        cmd.current_dir(&self.root);
        cmd
    }
}

#[test]
fn test_run_passes_and_writes_summary() -> Result<()> {
    let env = ParityTestEnv::new(10)?;

    env.parity()
        .arg("run")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("CNT-001"))
        .stdout(predicate::str::contains("PASS"));

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(env.root.join("target/run_summary.json"))?)?;
    assert_eq!(summary["overall"], "PASS");
    assert_eq!(summary["counts"]["total"], 2);

    let history = fs::read_to_string(env.root.join("target/verdict_history.jsonl"))?;
    assert_eq!(history.lines().count(), 2);
    Ok(())
}

#[test]
fn test_run_exits_one_on_failure() -> Result<()> {
    let env = ParityTestEnv::new(7)?;
    env.parity()
        .args(["run", "--checks", "count"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAIL"));
    Ok(())
}

#[test]
fn test_run_exits_two_when_a_rule_errors() -> Result<()> {
    let env = ParityTestEnv::new(10)?;
    fs::write(
        env.root.join("rules/broken.yml"),
        "rules:\n  - rule_id: NUL-404\n    check_kind: \"null\"\n    table: no_such_table\n    column: id\n",
    )?;
    env.parity()
        .arg("run")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("NUL-404"))
        .stdout(predicate::str::contains("ERROR"));

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(env.root.join("target/run_summary.json"))?)?;
    assert_eq!(summary["overall"], "ERROR");
    assert_eq!(summary["counts"]["errors"], 1);
    Ok(())
}

#[test]
fn test_unknown_rule_is_a_config_error() -> Result<()> {
    let env = ParityTestEnv::new(10)?;
    env.parity()
        .args(["run", "--rule", "NOPE-1"])
        .assert()
        .code(4);
    Ok(())
}

#[test]
fn test_all_stores_unreachable_is_fatal() -> Result<()> {
    let env = ParityTestEnv::new(10)?;
    fs::remove_file(env.root.join("source.duckdb"))?;
    fs::remove_file(env.root.join("target.duckdb"))?;
    env.parity().arg("run").assert().code(3);
    Ok(())
}

#[test]
fn test_validate_rejects_invalid_rule() -> Result<()> {
    let env = ParityTestEnv::new(10)?;
    env.parity().arg("validate").assert().code(0);

    fs::write(
        env.root.join("rules/bad.yml"),
        "rules:\n  - rule_id: BAD\n    check_kind: count\n    source: a\n    target: b\n    tolerance: 2.0\n",
    )?;
    env.parity()
        .arg("validate")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("BAD"));
    Ok(())
}

#[test]
fn test_query_refuses_writes() -> Result<()> {
    let env = ParityTestEnv::new(10)?;
    env.parity()
        .args(["query", "DROP TABLE orders"])
        .assert()
        .code(4);
    env.parity()
        .args(["query", "SELECT COUNT(*) AS n FROM orders", "--store", "source"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("10"));
    Ok(())
}

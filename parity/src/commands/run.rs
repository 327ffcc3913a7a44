// parity/src/commands/run.rs
//
// USE CASE: Evaluate the rules of a project.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use parity_core::application::{RunRequest, run_project};
use parity_core::domain::{CheckKind, RunSummary, VerdictStatus};
use parity_core::infrastructure::config::RuleFilter;
use parity_core::infrastructure::report::write_run_artifacts;

use crate::commands::report;

pub async fn execute(
    project_dir: PathBuf,
    checks: Vec<CheckKind>,
    rule: Option<String>,
    max_parallel: Option<usize>,
    timeout_secs: Option<u64>,
) -> i32 {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let request = RunRequest {
        filter: RuleFilter {
            kinds: checks,
            rule_id: rule,
        },
        max_parallel,
        timeout: timeout_secs.map(Duration::from_secs),
    };
    let result = run_project(&project_dir, &request, cancel).await;
    interrupt.abort();

    let (settings, summary) = match result {
        Ok(done) => done,
        Err(e) => return report(e),
    };

    print_summary(&summary);

    match write_run_artifacts(&settings.output_path(&project_dir), &summary) {
        Ok(paths) => println!("Summary written to {}", paths.summary.display()),
        Err(e) => return report(e.into()),
    }

    summary.exit_code()
}

fn status_cell(status: VerdictStatus) -> Cell {
    let color = match status {
        VerdictStatus::Pass => Color::Green,
        VerdictStatus::Warning => Color::Yellow,
        VerdictStatus::Fail => Color::Red,
        VerdictStatus::Error => Color::Magenta,
    };
    Cell::new(status.as_str()).fg(color)
}

fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Rule", "Check", "Table", "Column", "Status", "Rows", "Violations", "Ratio",
        ]);

    for v in &summary.verdicts {
        table.add_row(vec![
            Cell::new(v.rule_id()),
            Cell::new(v.check_kind().as_str()),
            Cell::new(v.table()),
            Cell::new(v.column().unwrap_or("-")),
            status_cell(v.status()),
            Cell::new(v.total_rows()),
            Cell::new(v.violation_count()),
            Cell::new(
                v.violation_ratio()
                    .map(|r| format!("{:.4}", r))
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }
    println!("{table}");

    let c = &summary.counts;
    println!(
        "Overall: {}  ({} verdicts: {} pass, {} warning, {} fail, {} error, pass rate {:.2}%)",
        summary.overall, c.total, c.passed, c.warnings, c.failed, c.errors, c.pass_rate
    );
    if summary.is_partial() {
        println!(
            "Not evaluated ({}): {}",
            summary.not_evaluated.len(),
            summary.not_evaluated.join(", ")
        );
    }
}

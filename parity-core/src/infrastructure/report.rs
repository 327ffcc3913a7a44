// parity-core/src/infrastructure/report.rs

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::verdict::{RunSummary, Verdict};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::{append_lines, atomic_write};

pub const SUMMARY_FILE: &str = "run_summary.json";
pub const HISTORY_FILE: &str = "verdict_history.jsonl";

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub summary: PathBuf,
    pub history: PathBuf,
}

/// One history line, keyed by rule_id + executed_at.
#[derive(Serialize)]
struct HistoryRecord<'a> {
    run_started_at: String,
    #[serde(flatten)]
    verdict: &'a Verdict,
}

/// Persists a run: the full summary (replaced atomically) and one history
/// line per verdict (appended).
pub fn write_run_artifacts(
    output_dir: &Path,
    summary: &RunSummary,
) -> Result<ReportPaths, InfrastructureError> {
    let paths = ReportPaths {
        summary: output_dir.join(SUMMARY_FILE),
        history: output_dir.join(HISTORY_FILE),
    };

    let json = serde_json::to_string_pretty(summary)?;
    atomic_write(&paths.summary, json)?;

    let started = summary.started_at.to_rfc3339();
    let lines = summary
        .verdicts
        .iter()
        .map(|verdict| {
            serde_json::to_string(&HistoryRecord {
                run_started_at: started.clone(),
                verdict,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    append_lines(&paths.history, lines)?;

    info!(summary = %paths.summary.display(), verdicts = summary.verdicts.len(), "Run artifacts written");
    Ok(paths)
}

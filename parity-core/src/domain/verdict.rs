// parity-core/src/domain/verdict.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::compliance::tolerance;
use crate::domain::rule::{CheckKind, RuleDefinition};

pub const EXIT_PASS: i32 = 0;
pub const EXIT_FAIL: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
/// No store was reachable at startup; no rule could run.
pub const EXIT_FATAL_CONNECTIVITY: i32 = 3;
/// Project or rule configuration could not be loaded.
pub const EXIT_CONFIG: i32 = 4;

/// Declaration order is precedence order: `max()` over a set of statuses is
/// the overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Pass,
    Warning,
    Fail,
    Error,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warning => "WARNING",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }

    /// Pure reduction: ERROR > FAIL > WARNING > PASS. Empty input is PASS.
    pub fn reduce<I: IntoIterator<Item = VerdictStatus>>(statuses: I) -> VerdictStatus {
        statuses.into_iter().max().unwrap_or(VerdictStatus::Pass)
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a successful measurement. ERROR is deliberately absent: it can
/// only come from [`Verdict::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Warning,
    Fail,
}

impl Outcome {
    pub fn pass_if(ok: bool) -> Self {
        if ok { Outcome::Pass } else { Outcome::Fail }
    }

    /// Violations downgrade to WARNING instead of FAIL.
    pub fn warn_if_any(violations: u64) -> Self {
        if violations == 0 {
            Outcome::Pass
        } else {
            Outcome::Warning
        }
    }
}

impl From<Outcome> for VerdictStatus {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Pass => VerdictStatus::Pass,
            Outcome::Warning => VerdictStatus::Warning,
            Outcome::Fail => VerdictStatus::Fail,
        }
    }
}

/// What a check strategy measured. Turned into a [`Verdict`] by the evaluator.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub table: String,
    pub column: Option<String>,
    pub outcome: Outcome,
    pub total_rows: u64,
    pub violation_count: u64,
    pub details: Map<String, Value>,
}

impl Measurement {
    pub fn new(
        table: impl Into<String>,
        column: Option<String>,
        total_rows: u64,
        violation_count: u64,
        outcome: Outcome,
    ) -> Self {
        Self {
            table: table.into(),
            column,
            outcome,
            total_rows,
            violation_count,
            details: Map::new(),
        }
    }

    /// The reserved zero-row outcome: WARNING, ratio 0, flagged `empty`.
    pub fn empty(table: impl Into<String>, column: Option<String>) -> Self {
        Self::new(table, column, 0, 0, Outcome::Warning).with_detail("empty", true)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of evaluating one rule (or one partition of it) against live data.
/// Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    rule_id: String,
    check_kind: CheckKind,
    table: String,
    column: Option<String>,
    status: VerdictStatus,
    total_rows: u64,
    violation_count: u64,
    violation_ratio: Option<f64>,
    details: Map<String, Value>,
    executed_at: DateTime<Utc>,
}

impl Verdict {
    pub fn measured(rule: &RuleDefinition, m: Measurement) -> Self {
        Self {
            rule_id: rule.rule_id.clone(),
            check_kind: rule.kind(),
            table: m.table,
            column: m.column,
            status: m.outcome.into(),
            total_rows: m.total_rows,
            violation_count: m.violation_count,
            violation_ratio: Some(tolerance::ratio(m.violation_count, m.total_rows)),
            details: m.details,
            executed_at: Utc::now(),
        }
    }

    /// Execution failure. Carries no ratio.
    pub fn error(rule: &RuleDefinition, error_class: &str, message: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("error_class".into(), Value::from(error_class));
        details.insert("message".into(), Value::from(message.into()));
        Self {
            rule_id: rule.rule_id.clone(),
            check_kind: rule.kind(),
            table: rule.primary_table(),
            column: rule.primary_column(),
            status: VerdictStatus::Error,
            total_rows: 0,
            violation_count: 0,
            violation_ratio: None,
            details,
            executed_at: Utc::now(),
        }
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn check_kind(&self) -> CheckKind {
        self.check_kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn status(&self) -> VerdictStatus {
        self.status
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn violation_count(&self) -> u64 {
        self.violation_count
    }

    pub fn violation_ratio(&self) -> Option<f64> {
        self.violation_ratio
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub errors: usize,
    /// Percentage of PASS verdicts, 0 when there are none.
    pub pass_rate: f64,
}

impl SummaryCounts {
    fn tally(verdicts: &[Verdict]) -> Self {
        let mut c = SummaryCounts {
            total: verdicts.len(),
            ..Default::default()
        };
        for v in verdicts {
            match v.status() {
                VerdictStatus::Pass => c.passed += 1,
                VerdictStatus::Warning => c.warnings += 1,
                VerdictStatus::Fail => c.failed += 1,
                VerdictStatus::Error => c.errors += 1,
            }
        }
        if c.total > 0 {
            c.pass_rate = (c.passed as f64 / c.total as f64 * 10_000.0).round() / 100.0;
        }
        c
    }
}

/// Everything a reporter needs about one run. Partial runs are still valid.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub overall: VerdictStatus,
    pub counts: SummaryCounts,
    pub verdicts: Vec<Verdict>,
    /// Rules never evaluated because the run was cancelled or timed out.
    pub not_evaluated: Vec<String>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(
        verdicts: Vec<Verdict>,
        not_evaluated: Vec<String>,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            overall: VerdictStatus::reduce(verdicts.iter().map(Verdict::status)),
            counts: SummaryCounts::tally(&verdicts),
            verdicts,
            not_evaluated,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.not_evaluated.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        match self.overall {
            VerdictStatus::Error => EXIT_ERROR,
            _ if self.is_partial() => EXIT_ERROR,
            VerdictStatus::Fail => EXIT_FAIL,
            VerdictStatus::Pass | VerdictStatus::Warning => EXIT_PASS,
        }
    }

    pub fn verdicts_for<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a Verdict> + 'a {
        self.verdicts.iter().filter(move |v| v.rule_id() == rule_id)
    }
}

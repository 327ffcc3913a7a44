// parity-core/src/application/checks/mod.rs

//! One strategy per `check_kind`, dispatched by [`evaluate`].
//!
//! Strategies only read. They return [`Measurement`]s; any error bubbles up
//! and the orchestrator turns it into an ERROR verdict for that rule alone.

mod count;
mod duplicate;
mod masking;
mod null;
mod range;
mod referential;
mod transform;

use serde_json::Value;
use tracing::instrument;

use crate::application::context::RunContext;
use crate::application::executor::{StoreSession, value_as_u64};
use crate::domain::rule::{CheckSpec, RuleDefinition};
use crate::domain::verdict::{Measurement, Verdict};
use crate::error::ParityError;
use crate::ports::Row;

/// Offending keys/values kept in verdict details.
pub const SAMPLE_LIMIT: usize = 5;

#[instrument(skip_all, fields(rule_id = %rule.rule_id, kind = %rule.kind()))]
pub async fn evaluate(
    ctx: &RunContext,
    rule: &RuleDefinition,
) -> Result<Vec<Verdict>, ParityError> {
    let measurements: Vec<Measurement> = match &rule.check {
        CheckSpec::Count(p) => vec![count::measure(ctx, p).await?],
        CheckSpec::Null(p) => vec![null::measure(ctx, p).await?],
        CheckSpec::Duplicate(p) => vec![duplicate::measure(ctx, p).await?],
        CheckSpec::Range(p) => vec![range::measure(ctx, p).await?],
        CheckSpec::ReferentialIntegrity(p) => vec![referential::measure(ctx, p).await?],
        CheckSpec::Transform(p) => {
            let label = rule.primary_table();
            transform::measure(ctx, p, &label).await?
        }
        CheckSpec::Masking(p) => vec![masking::measure(ctx, p).await?],
    };

    Ok(measurements
        .into_iter()
        .map(|m| Verdict::measured(rule, m))
        .collect())
}

/// Named integer column of the first row; NULL reads as 0.
fn column_u64(session: &StoreSession, row: Option<&Row>, name: &str) -> Result<u64, ParityError> {
    let value = row.and_then(|r| r.get(name)).unwrap_or(&Value::Null);
    if value.is_null() {
        return Ok(0);
    }
    value_as_u64(value).ok_or_else(|| ParityError::QueryExecution {
        store: session.store().to_string(),
        reason: format!("column '{}' is not a count: {}", name, value),
    })
}

/// `(COUNT(*), rows matching predicate)` in a single scan.
async fn total_and_matching(
    session: &StoreSession,
    table_sql: &str,
    predicate: &str,
) -> Result<(u64, u64), ParityError> {
    let rows = session
        .rows(&format!(
            "SELECT COUNT(*) AS total_rows, \
             COALESCE(SUM(CASE WHEN {p} THEN 1 ELSE 0 END), 0) AS matching \
             FROM {t}",
            p = predicate,
            t = table_sql
        ))
        .await?;
    let first = rows.first();
    Ok((
        column_u64(session, first, "total_rows")?,
        column_u64(session, first, "matching")?,
    ))
}

/// Up to [`SAMPLE_LIMIT`] values of `select_sql` for rows matching `predicate`.
async fn sample(
    session: &StoreSession,
    table_sql: &str,
    select_sql: &str,
    predicate: &str,
) -> Result<Vec<Value>, ParityError> {
    let rows = session
        .rows(&format!(
            "SELECT {s} AS sample FROM {t} WHERE {p} LIMIT {n}",
            s = select_sql,
            t = table_sql,
            p = predicate,
            n = SAMPLE_LIMIT
        ))
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|mut r| r.remove("sample"))
        .collect())
}

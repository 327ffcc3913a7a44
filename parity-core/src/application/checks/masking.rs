// parity-core/src/application/checks/masking.rs

use serde_json::Value;

use crate::application::checks::{column_u64, sample, total_and_matching};
use crate::application::context::RunContext;
use crate::domain::compiler::quoter::SqlQuoter;
use crate::domain::rule::MaskingParams;
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;

/// Keeps the shape of a sample but not its content, so reports never carry
/// the raw value that leaked.
pub(crate) fn redact(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(redact_str(s)),
        other => Value::String(redact_str(&other.to_string())),
    }
}

fn redact_str(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { 'x' } else { c })
        .collect()
}

pub(super) async fn measure(
    ctx: &RunContext,
    p: &MaskingParams,
) -> Result<Measurement, ParityError> {
    let session = ctx.connect(&p.table.store).await?;
    let table_sql = SqlQuoter::ident(&p.table.table);
    let col = SqlQuoter::ident(&p.column);
    let predicate = format!(
        "{} IS NOT NULL AND {}",
        col,
        p.shape.violation_predicate(&col, p.method)
    );

    let (total, violations) = total_and_matching(&session, &table_sql, &predicate).await?;
    if total == 0 {
        return Ok(Measurement::empty(p.table.table.clone(), Some(p.column.clone())));
    }
    let nulls = session
        .rows(&format!(
            "SELECT COUNT(*) - COUNT({c}) AS null_count FROM {t}",
            c = col,
            t = table_sql
        ))
        .await?;
    let null_count = column_u64(&session, nulls.first(), "null_count")?;

    let mut m = Measurement::new(
        p.table.table.clone(),
        Some(p.column.clone()),
        total,
        violations,
        Outcome::pass_if(violations == 0),
    )
    .with_detail("shape", p.shape.kind_name())
    .with_detail("method", p.method.to_string())
    .with_detail("expected_format", p.shape.expected_format())
    .with_detail("null_count", null_count);

    if violations > 0 {
        let shown = format!("CAST({} AS VARCHAR)", col);
        let samples = sample(&session, &table_sql, &shown, &predicate).await?;
        m = m.with_detail(
            "sample_values",
            samples.iter().map(redact).collect::<Vec<_>>(),
        );
    }

    Ok(m)
}

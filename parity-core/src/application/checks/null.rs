// parity-core/src/application/checks/null.rs

use crate::application::checks::column_u64;
use crate::application::context::RunContext;
use crate::domain::compiler::quoter::SqlQuoter;
use crate::domain::compliance::tolerance::ratio;
use crate::domain::rule::NullParams;
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;

/// Null and blank counts in one scan. The two subsets are disjoint: blanks
/// are only counted among non-null values.
pub(super) async fn measure(ctx: &RunContext, p: &NullParams) -> Result<Measurement, ParityError> {
    let session = ctx.connect(&p.table.store).await?;
    let table_sql = SqlQuoter::ident(&p.table.table);
    let col = SqlQuoter::ident(&p.column);

    let rows = session
        .rows(&format!(
            "SELECT COUNT(*) AS total_rows, \
             COALESCE(SUM(CASE WHEN {c} IS NULL THEN 1 ELSE 0 END), 0) AS null_count, \
             COALESCE(SUM(CASE WHEN {c} IS NOT NULL AND trim(CAST({c} AS VARCHAR)) = '' THEN 1 ELSE 0 END), 0) AS empty_count \
             FROM {t}",
            c = col,
            t = table_sql
        ))
        .await?;
    let first = rows.first();
    let total = column_u64(&session, first, "total_rows")?;
    let null_count = column_u64(&session, first, "null_count")?;
    let empty_count = column_u64(&session, first, "empty_count")?;

    if total == 0 {
        return Ok(Measurement::empty(p.table.table.clone(), Some(p.column.clone())));
    }

    let blank_count = if p.include_empty_string {
        null_count + empty_count
    } else {
        null_count
    };
    let blank_ratio = ratio(blank_count, total);

    Ok(Measurement::new(
        p.table.table.clone(),
        Some(p.column.clone()),
        total,
        blank_count,
        Outcome::pass_if(blank_ratio <= p.max_null_ratio),
    )
    .with_detail("null_count", null_count)
    .with_detail("empty_string_count", empty_count)
    .with_detail("blank_count", blank_count)
    .with_detail("include_empty_string", p.include_empty_string)
    .with_detail("blank_percentage", (blank_ratio * 10_000.0).round() / 100.0)
    .with_detail("max_null_ratio", p.max_null_ratio))
}

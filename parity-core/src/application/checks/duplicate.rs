// parity-core/src/application/checks/duplicate.rs

use serde_json::Value;

use crate::application::checks::{SAMPLE_LIMIT, column_u64};
use crate::application::context::RunContext;
use crate::domain::compiler::quoter::SqlQuoter;
use crate::domain::compliance::tolerance::ratio;
use crate::domain::rule::{DuplicateParams, KeyKind};
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;

/// `COUNT(*) - COUNT(DISTINCT key)` over rows whose key is fully non-null.
pub(super) async fn measure(
    ctx: &RunContext,
    p: &DuplicateParams,
) -> Result<Measurement, ParityError> {
    let session = ctx.connect(&p.table.store).await?;
    let table_sql = SqlQuoter::ident(&p.table.table);
    let key_sql = SqlQuoter::idents(&p.columns);
    let key_present = p
        .columns
        .iter()
        .map(|c| format!("{} IS NOT NULL", SqlQuoter::ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");

    let rows = session
        .rows(&format!(
            "SELECT \
               (SELECT COUNT(*) FROM {t}) AS total_rows, \
               (SELECT COUNT(*) FROM {t} WHERE {nn}) AS keyed_rows, \
               (SELECT COUNT(*) FROM (SELECT DISTINCT {k} FROM {t} WHERE {nn}) d) AS distinct_keys",
            t = table_sql,
            k = key_sql,
            nn = key_present
        ))
        .await?;
    let first = rows.first();
    let total = column_u64(&session, first, "total_rows")?;
    let keyed = column_u64(&session, first, "keyed_rows")?;
    let distinct = column_u64(&session, first, "distinct_keys")?;
    let column_label = Some(p.columns.join(", "));

    if total == 0 {
        return Ok(Measurement::empty(p.table.table.clone(), column_label));
    }

    let duplicates = keyed.saturating_sub(distinct);
    let dup_ratio = ratio(duplicates, total);
    let outcome = match (p.key_kind, p.threshold) {
        (KeyKind::PrimaryKey, _) => Outcome::pass_if(duplicates == 0),
        (_, Some(threshold)) => Outcome::pass_if(dup_ratio <= threshold),
        (_, None) => Outcome::warn_if_any(duplicates),
    };

    let mut m = Measurement::new(
        p.table.table.clone(),
        column_label,
        total,
        duplicates,
        outcome,
    )
    .with_detail("key_kind", p.key_kind.as_str())
    .with_detail("null_key_rows", total - keyed.min(total))
    .with_detail("distinct_keys", distinct);
    if let Some(threshold) = p.threshold {
        m = m.with_detail("threshold", threshold);
    }

    if duplicates > 0 {
        let groups = session
            .count(&format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM {t} WHERE {nn} GROUP BY {k} HAVING COUNT(*) > 1) g",
                t = table_sql,
                k = key_sql,
                nn = key_present
            ))
            .await?;
        let samples = session
            .rows(&format!(
                "SELECT {k}, COUNT(*) AS occurrences FROM {t} WHERE {nn} \
                 GROUP BY {k} HAVING COUNT(*) > 1 ORDER BY occurrences DESC, {k} LIMIT {n}",
                t = table_sql,
                k = key_sql,
                nn = key_present,
                n = SAMPLE_LIMIT
            ))
            .await?;
        m = m
            .with_detail("duplicate_groups", groups)
            .with_detail(
                "sample_keys",
                Value::Array(samples.into_iter().map(Value::Object).collect()),
            );
    }

    Ok(m)
}

// parity-core/src/application/checks/range.rs

use serde_json::Value;
use tracing::debug;

use crate::application::checks::{column_u64, sample, total_and_matching};
use crate::application::context::RunContext;
use crate::application::executor::{StoreSession, value_as_f64};
use crate::domain::compiler::quoter::SqlQuoter;
use crate::domain::compliance::outlier::{OutlierCheck, SampleStats};
use crate::domain::rule::{RangeConstraint, RangeParams};
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;

fn or_join(parts: Vec<String>) -> String {
    if parts.is_empty() {
        "FALSE".to_string()
    } else {
        format!("({})", parts.join(" OR "))
    }
}

/// SQL predicate selecting violating rows for deterministic constraints.
fn violation_predicate(constraint: &RangeConstraint, col: &str) -> Option<String> {
    match constraint {
        RangeConstraint::Numeric { min, max } => {
            let mut parts = Vec::new();
            if let Some(lo) = min {
                parts.push(format!("{} < {}", col, lo));
            }
            if let Some(hi) = max {
                parts.push(format!("{} > {}", col, hi));
            }
            Some(format!("{} IS NOT NULL AND {}", col, or_join(parts)))
        }
        RangeConstraint::Date { min_date, max_date } => {
            let mut parts = Vec::new();
            if let Some(lo) = min_date {
                parts.push(format!(
                    "CAST({} AS DATE) < CAST({} AS DATE)",
                    col,
                    SqlQuoter::literal(&lo.to_string())
                ));
            }
            if let Some(hi) = max_date {
                parts.push(format!(
                    "CAST({} AS DATE) > CAST({} AS DATE)",
                    col,
                    SqlQuoter::literal(&hi.to_string())
                ));
            }
            Some(format!("{} IS NOT NULL AND {}", col, or_join(parts)))
        }
        RangeConstraint::NoFuture => Some(format!(
            "{c} IS NOT NULL AND CAST({c} AS TIMESTAMP) > CAST(now() AS TIMESTAMP)",
            c = col
        )),
        RangeConstraint::DateOrder {
            start_column,
            end_column,
        } => {
            let (s, e) = (SqlQuoter::ident(start_column), SqlQuoter::ident(end_column));
            Some(format!(
                "{s} IS NOT NULL AND {e} IS NOT NULL AND {s} > {e}",
                s = s,
                e = e
            ))
        }
        RangeConstraint::AllowedValues { values } => {
            let list = values
                .iter()
                .map(|v| SqlQuoter::literal(v))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "{c} IS NOT NULL AND CAST({c} AS VARCHAR) NOT IN ({l})",
                c = col,
                l = list
            ))
        }
        RangeConstraint::Outlier { .. } => None,
    }
}

async fn observed_bounds(
    session: &StoreSession,
    table_sql: &str,
    col: &str,
) -> Result<(Value, Value), ParityError> {
    let rows = session
        .rows(&format!(
            "SELECT MIN({c}) AS observed_min, MAX({c}) AS observed_max FROM {t}",
            c = col,
            t = table_sql
        ))
        .await?;
    let mut first = rows.into_iter().next().unwrap_or_default();
    Ok((
        first.remove("observed_min").unwrap_or(Value::Null),
        first.remove("observed_max").unwrap_or(Value::Null),
    ))
}

pub(super) async fn measure(ctx: &RunContext, p: &RangeParams) -> Result<Measurement, ParityError> {
    let session = ctx.connect(&p.table.store).await?;
    let table_sql = SqlQuoter::ident(&p.table.table);
    let column = p.column.clone();
    let col = column.as_deref().map(SqlQuoter::ident).unwrap_or_default();
    let report_column = match &p.constraint {
        RangeConstraint::DateOrder {
            start_column,
            end_column,
        } => Some(format!("{} > {}", start_column, end_column)),
        _ => column.clone(),
    };

    if let RangeConstraint::Outlier { sigma, min_samples } = &p.constraint {
        return measure_outliers(
            &session,
            &table_sql,
            &col,
            (p.table.table.as_str(), column.as_deref().unwrap_or_default()),
            *sigma,
            *min_samples,
        )
        .await;
    }

    let predicate = violation_predicate(&p.constraint, &col).ok_or_else(|| {
        ParityError::InternalError("range constraint without predicate".into())
    })?;
    let (total, violations) = total_and_matching(&session, &table_sql, &predicate).await?;
    if total == 0 {
        return Ok(Measurement::empty(p.table.table.clone(), report_column));
    }

    let mut m = Measurement::new(
        p.table.table.clone(),
        report_column,
        total,
        violations,
        Outcome::pass_if(violations == 0),
    )
    .with_detail("constraint", p.constraint.kind_name());

    match &p.constraint {
        RangeConstraint::Numeric { min, max } => {
            m = m.with_detail("min", *min).with_detail("max", *max);
        }
        RangeConstraint::Date { min_date, max_date } => {
            m = m
                .with_detail("min_date", min_date.map(|d| d.to_string()))
                .with_detail("max_date", max_date.map(|d| d.to_string()));
        }
        RangeConstraint::AllowedValues { values } => {
            m = m.with_detail("allowed_values", values.clone());
        }
        _ => {}
    }

    if !matches!(p.constraint, RangeConstraint::DateOrder { .. }) {
        let (lo, hi) = observed_bounds(&session, &table_sql, &col).await?;
        m = m.with_detail("observed_min", lo).with_detail("observed_max", hi);
    }

    if violations > 0 {
        let shown = match &p.constraint {
            RangeConstraint::DateOrder {
                start_column,
                end_column,
            } => format!(
                "CAST({} AS VARCHAR) || ' > ' || CAST({} AS VARCHAR)",
                SqlQuoter::ident(start_column),
                SqlQuoter::ident(end_column)
            ),
            _ => col.clone(),
        };
        let samples = sample(&session, &table_sql, &shown, &predicate).await?;
        m = m.with_detail("sample_values", samples);
    }

    Ok(m)
}

/// Values beyond mean ± sigma·stddev. Never worse than WARNING.
async fn measure_outliers(
    session: &StoreSession,
    table_sql: &str,
    col: &str,
    (table, column): (&str, &str),
    sigma: f64,
    min_samples: u64,
) -> Result<Measurement, ParityError> {
    let rows = session
        .rows(&format!(
            "SELECT COUNT(*) AS total_rows, COUNT({c}) AS n, AVG({c}) AS mean, STDDEV_POP({c}) AS stddev FROM {t}",
            c = col,
            t = table_sql
        ))
        .await?;
    let first = rows.first();
    let total = column_u64(session, first, "total_rows")?;
    let count = column_u64(session, first, "n")?;
    let read = |name: &str| {
        first
            .and_then(|r| r.get(name))
            .and_then(value_as_f64)
            .unwrap_or(0.0)
    };
    let stats = SampleStats {
        count,
        mean: read("mean"),
        stddev: read("stddev"),
    };

    if total == 0 {
        return Ok(Measurement::empty(table, Some(column.to_string())));
    }

    let base = |violations: u64, outcome: Outcome| {
        Measurement::new(table, Some(column.to_string()), total, violations, outcome)
            .with_detail("constraint", "outlier")
            .with_detail("sigma", sigma)
            .with_detail("sample_size", stats.count)
            .with_detail("mean", stats.mean)
            .with_detail("stddev", stats.stddev)
    };

    let (lo, hi) = match OutlierCheck::bounds(column, &stats, sigma, min_samples) {
        Ok(b) => b,
        Err(skip) => {
            debug!(%skip, "Outlier check skipped");
            return Ok(base(0, Outcome::Pass)
                .with_detail("outlier_check", skip.reason())
                .with_detail("min_samples", min_samples));
        }
    };

    let predicate = format!(
        "{c} IS NOT NULL AND ({c} < {lo} OR {c} > {hi})",
        c = col,
        lo = lo,
        hi = hi
    );
    let (_, outliers) = total_and_matching(session, table_sql, &predicate).await?;
    let mut m = base(outliers, Outcome::warn_if_any(outliers))
        .with_detail("lower_bound", lo)
        .with_detail("upper_bound", hi);
    if outliers > 0 {
        m = m.with_detail("sample_values", sample(session, table_sql, col, &predicate).await?);
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_numeric_predicate_with_open_side() {
        let c = RangeConstraint::Numeric {
            min: Some(0.0),
            max: None,
        };
        assert_eq!(
            violation_predicate(&c, "\"amount\"").as_deref(),
            Some("\"amount\" IS NOT NULL AND (\"amount\" < 0)")
        );
    }

    #[test]
    fn test_date_predicate_uses_literals() {
        let c = RangeConstraint::Date {
            min_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            max_date: None,
        };
        let sql = violation_predicate(&c, "\"d\"").unwrap_or_default();
        assert!(sql.contains("CAST('2024-01-01' AS DATE)"));
    }

    #[test]
    fn test_allowed_values_are_escaped() {
        let c = RangeConstraint::AllowedValues {
            values: vec!["ok".into(), "it's".into()],
        };
        let sql = violation_predicate(&c, "\"status\"").unwrap_or_default();
        assert!(sql.ends_with("NOT IN ('ok', 'it''s')"));
    }
}

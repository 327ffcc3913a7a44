// parity-core/src/application/checks/transform.rs

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::application::checks::SAMPLE_LIMIT;
use crate::application::context::RunContext;
use crate::application::executor::value_as_f64;
use crate::domain::compliance::tolerance::within_epsilon;
use crate::domain::rule::{TransformComparison, TransformParams};
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;
use crate::ports::Row;

async fn fetch(ctx: &RunContext, store: &str, query: &str) -> Result<Vec<Row>, ParityError> {
    let session = ctx.connect(store).await?;
    session.rows(query).await
}

fn missing_column(side: &str, column: &str) -> ParityError {
    ParityError::QueryExecution {
        store: side.to_string(),
        reason: format!("result has no column '{}'", column),
    }
}

/// Stable textual key for a partition / join value.
fn key_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Rows keyed by `key`. A repeated key keeps the last row; the number of
/// rows shadowed that way is returned alongside.
fn index_by(
    rows: Vec<Row>,
    store: &str,
    key: &str,
    value: Option<&str>,
) -> Result<(BTreeMap<String, Value>, usize), ParityError> {
    let mut map = BTreeMap::new();
    let mut duplicates = 0usize;
    for mut row in rows {
        let k = row.get(key).map(key_of).ok_or_else(|| missing_column(store, key))?;
        let v = match value {
            Some(col) => row.remove(col).ok_or_else(|| missing_column(store, col))?,
            None => Value::Null,
        };
        if map.insert(k, v).is_some() {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        warn!(store, key, duplicates, "Repeated keys in transform result, last row kept");
    }
    Ok((map, duplicates))
}

/// Both NULL is a match; numbers use epsilon; anything else must be equal.
fn values_match(source: &Value, target: &Value, epsilon: f64) -> bool {
    match (value_as_f64(source), value_as_f64(target)) {
        (Some(a), Some(b)) if !source.is_string() || !target.is_string() => {
            within_epsilon(a, b, epsilon)
        }
        _ => source == target,
    }
}

fn difference(source: &Value, target: &Value) -> Value {
    match (value_as_f64(source), value_as_f64(target)) {
        (Some(a), Some(b)) => Value::from((a - b).abs()),
        _ => Value::Null,
    }
}

pub(super) async fn measure(
    ctx: &RunContext,
    p: &TransformParams,
    label: &str,
) -> Result<Vec<Measurement>, ParityError> {
    let epsilon = p.epsilon.unwrap_or_else(|| ctx.default_epsilon());
    let [source_query, target_query] = p.comparison.queries();
    let source_rows = fetch(ctx, &p.source_store, source_query).await?;
    let target_rows = fetch(ctx, &p.target_store, target_query).await?;
    debug!(
        source_rows = source_rows.len(),
        target_rows = target_rows.len(),
        "Transform queries fetched"
    );

    match &p.comparison {
        TransformComparison::Aggregate {
            compare_column,
            partition_column: None,
            ..
        } => {
            let pick = |rows: &[Row], store: &str| -> Result<Value, ParityError> {
                match rows.first() {
                    None => Ok(Value::Null),
                    Some(r) => r
                        .get(compare_column)
                        .cloned()
                        .ok_or_else(|| missing_column(store, compare_column)),
                }
            };
            if source_rows.is_empty() && target_rows.is_empty() {
                return Ok(vec![Measurement::empty(label, Some(compare_column.clone()))]);
            }
            let s = pick(&source_rows, &p.source_store)?;
            let t = pick(&target_rows, &p.target_store)?;
            let ok = values_match(&s, &t, epsilon);
            Ok(vec![
                Measurement::new(label, Some(compare_column.clone()), 1, u64::from(!ok), Outcome::pass_if(ok))
                    .with_detail("mode", "aggregate")
                    .with_detail("difference", difference(&s, &t))
                    .with_detail("source_value", s)
                    .with_detail("target_value", t)
                    .with_detail("epsilon", epsilon),
            ])
        }
        TransformComparison::Aggregate {
            compare_column,
            partition_column: Some(partition),
            ..
        } => {
            let (source, source_dups) =
                index_by(source_rows, &p.source_store, partition, Some(compare_column))?;
            let (target, target_dups) =
                index_by(target_rows, &p.target_store, partition, Some(compare_column))?;
            let keys: BTreeSet<&String> = source.keys().chain(target.keys()).collect();
            if keys.is_empty() {
                return Ok(vec![Measurement::empty(label, Some(compare_column.clone()))]);
            }

            let mut out = Vec::with_capacity(keys.len());
            let mut failed = 0usize;
            for key in keys {
                let (s, t) = (source.get(key), target.get(key));
                let mut m = match (s, t) {
                    (Some(s), Some(t)) => {
                        let ok = values_match(s, t, epsilon);
                        Measurement::new(label, Some(compare_column.clone()), 1, u64::from(!ok), Outcome::pass_if(ok))
                            .with_detail("difference", difference(s, t))
                    }
                    (Some(_), None) => Measurement::new(label, Some(compare_column.clone()), 1, 1, Outcome::Fail)
                        .with_detail("missing_in", "target"),
                    _ => Measurement::new(label, Some(compare_column.clone()), 1, 1, Outcome::Fail)
                        .with_detail("missing_in", "source"),
                };
                if m.outcome == Outcome::Fail {
                    failed += 1;
                }
                m = m
                    .with_detail("mode", "aggregate")
                    .with_detail("partition_column", partition.clone())
                    .with_detail("partition", key.clone())
                    .with_detail("source_value", s.cloned())
                    .with_detail("target_value", t.cloned())
                    .with_detail("epsilon", epsilon)
                    .with_detail("duplicate_keys", source_dups + target_dups);
                out.push(m);
            }
            info!(partitions = out.len(), failed, "Partitioned transform compared");
            Ok(out)
        }
        TransformComparison::Join {
            join_key,
            compare_column,
            ..
        } => {
            let (source, source_dups) =
                index_by(source_rows, &p.source_store, join_key, Some(compare_column))?;
            let (target, target_dups) =
                index_by(target_rows, &p.target_store, join_key, Some(compare_column))?;
            let missing_in_target: Vec<&String> =
                source.keys().filter(|k| !target.contains_key(*k)).collect();
            let missing_in_source: Vec<&String> =
                target.keys().filter(|k| !source.contains_key(*k)).collect();
            let mismatched: Vec<(&String, &Value, &Value)> = source
                .iter()
                .filter_map(|(k, s)| target.get(k).map(|t| (k, s, t)))
                .filter(|(_, s, t)| !values_match(s, t, epsilon))
                .collect();

            let total = (source.len() + missing_in_source.len()) as u64;
            if total == 0 {
                return Ok(vec![Measurement::empty(label, Some(compare_column.clone()))]);
            }
            let violations =
                (missing_in_target.len() + missing_in_source.len() + mismatched.len()) as u64;
            let samples: Vec<Value> = mismatched
                .iter()
                .take(SAMPLE_LIMIT)
                .map(|(k, s, t)| {
                    serde_json::json!({ "key": k, "source": s, "target": t, "difference": difference(s, t) })
                })
                .collect();

            Ok(vec![
                Measurement::new(label, Some(compare_column.clone()), total, violations, Outcome::pass_if(violations == 0))
                    .with_detail("mode", "join")
                    .with_detail("join_key", join_key.clone())
                    .with_detail("source_rows", source.len())
                    .with_detail("target_rows", target.len())
                    .with_detail("missing_in_target", missing_in_target.len())
                    .with_detail("missing_in_source", missing_in_source.len())
                    .with_detail("mismatched", mismatched.len())
                    .with_detail("duplicate_keys", source_dups + target_dups)
                    .with_detail("epsilon", epsilon)
                    .with_detail("sample_mismatches", samples)
                    .with_detail("sample_missing_in_target", sample_keys(&missing_in_target)),
            ])
        }
        TransformComparison::Existence { join_key, .. } => {
            let (source, source_dups) = index_by(source_rows, &p.source_store, join_key, None)?;
            let (target, target_dups) = index_by(target_rows, &p.target_store, join_key, None)?;
            if source.is_empty() {
                return Ok(vec![Measurement::empty(label, Some(join_key.clone()))]);
            }
            let missing: Vec<&String> =
                source.keys().filter(|k| !target.contains_key(*k)).collect();
            let extra = target.keys().filter(|k| !source.contains_key(*k)).count();
            Ok(vec![
                Measurement::new(
                    label,
                    Some(join_key.clone()),
                    source.len() as u64,
                    missing.len() as u64,
                    Outcome::pass_if(missing.is_empty()),
                )
                .with_detail("mode", "existence")
                .with_detail("missing_in_target", missing.len())
                .with_detail("extra_in_target", extra)
                .with_detail("duplicate_keys", source_dups + target_dups)
                .with_detail("sample_missing_in_target", sample_keys(&missing)),
            ])
        }
    }
}

fn sample_keys(keys: &[&String]) -> Vec<Value> {
    keys.iter()
        .take(SAMPLE_LIMIT)
        .map(|k| Value::String((*k).clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_values_match_with_epsilon() {
        assert!(values_match(&Value::from(250.005), &Value::from(250.0), 0.01));
        assert!(!values_match(&Value::from(250.02), &Value::from(250.0), 0.01));
        assert!(values_match(&Value::Null, &Value::Null, 0.01));
        assert!(!values_match(&Value::from(1.0), &Value::Null, 0.01));
        assert!(values_match(&Value::from("A"), &Value::from("A"), 0.01));
        assert!(!values_match(&Value::from("01"), &Value::from("1"), 0.01));
    }

    #[test]
    fn test_index_by_counts_repeated_keys() {
        let rows: Vec<Row> = [(1, 10.0), (2, 20.0), (1, 11.0)]
            .into_iter()
            .map(|(k, v)| {
                let mut row = Row::new();
                row.insert("k".into(), Value::from(k));
                row.insert("v".into(), Value::from(v));
                row
            })
            .collect();
        let (map, duplicates) = index_by(rows, "source", "k", Some("v")).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(duplicates, 1);
        assert_eq!(map["1"], Value::from(11.0));
        assert!(index_by(vec![Row::new()], "source", "k", None).is_err());
    }

    #[test]
    fn test_key_of_normalises_scalars() {
        assert_eq!(key_of(&Value::from("2024-01-01")), "2024-01-01");
        assert_eq!(key_of(&Value::from(7)), "7");
    }
}

// parity-core/src/application/chunked.rs

//! Range-chunked aggregation over a monotonic integer id column.
//!
//! A single `COUNT(*)` on a very large table can exceed the store's execution
//! timeout. Splitting `[MIN(id), MAX(id)]` into contiguous inclusive ranges
//! bounds each query, and since every row falls in exactly one range by its id
//! value, gaps in the id sequence do not matter.

use tracing::{debug, info, instrument, warn};

use crate::application::executor::{StoreSession, value_as_i64};
use crate::domain::compiler::quoter::SqlQuoter;
use crate::error::ParityError;
use crate::infrastructure::config::ChunkSettings;

/// Contiguous, non-overlapping inclusive ranges covering `[min, max]`.
/// The last range is clamped to `max`.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    next_start: Option<i64>,
    max: i64,
    span: i64,
}

impl ChunkRanges {
    pub fn new(min: i64, max: i64, chunk_size: u64) -> Self {
        let size = i64::try_from(chunk_size.max(1)).unwrap_or(i64::MAX);
        Self {
            next_start: (min <= max).then_some(min),
            max,
            span: size - 1,
        }
    }
}

impl Iterator for ChunkRanges {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let end = start.checked_add(self.span).map_or(self.max, |e| e.min(self.max));
        self.next_start = if end >= self.max { None } else { Some(end + 1) };
        Some((start, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountResult {
    pub count: u64,
    /// Number of range queries issued; 0 for a direct count.
    pub chunks: usize,
}

impl CountResult {
    pub fn chunked(&self) -> bool {
        self.chunks > 0
    }
}

async fn id_bounds(
    session: &StoreSession,
    table_sql: &str,
    id_sql: &str,
) -> Result<Option<(i64, i64)>, ParityError> {
    let rows = session
        .rows(&format!(
            "SELECT MIN({id}) AS min_id, MAX({id}) AS max_id FROM {t}",
            id = id_sql,
            t = table_sql
        ))
        .await?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let (Some(min), Some(max)) = (
        row.get("min_id").filter(|v| !v.is_null()),
        row.get("max_id").filter(|v| !v.is_null()),
    ) else {
        return Ok(None);
    };
    match (value_as_i64(min), value_as_i64(max)) {
        (Some(lo), Some(hi)) => Ok(Some((lo, hi))),
        _ => Err(ParityError::QueryExecution {
            store: session.store().to_string(),
            reason: format!("id column bounds are not integers: {} / {}", min, max),
        }),
    }
}

/// `COUNT(*)` over `table`, one `BETWEEN` query per chunk.
#[instrument(skip(session), fields(store = session.store()))]
pub async fn chunked_count(
    session: &StoreSession,
    table: &str,
    id_column: &str,
    chunk_size: u64,
) -> Result<CountResult, ParityError> {
    let table_sql = SqlQuoter::ident(table);
    let id_sql = SqlQuoter::ident(id_column);
    // Rows without an id fall in no range.
    let unkeyed = session
        .count(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
            table_sql, id_sql
        ))
        .await?;
    let Some((min, max)) = id_bounds(session, &table_sql, &id_sql).await? else {
        return Ok(CountResult {
            count: unkeyed,
            chunks: 0,
        });
    };

    let mut total: u64 = unkeyed;
    let mut chunks = 0;
    for (start, end) in ChunkRanges::new(min, max, chunk_size) {
        let n = session
            .count(&format!(
                "SELECT COUNT(*) FROM {} WHERE {} BETWEEN {} AND {}",
                table_sql, id_sql, start, end
            ))
            .await?;
        total = total.saturating_add(n);
        chunks += 1;
        debug!(start, end, n, total, "Chunk counted");
    }
    info!(table, chunks, total, "Chunked count finished");
    Ok(CountResult {
        count: total,
        chunks,
    })
}

/// `SUM(column)` over `table`, chunked like [`chunked_count`]. `None` when
/// every value is NULL or the table is empty.
#[instrument(skip(session), fields(store = session.store()))]
pub async fn chunked_sum(
    session: &StoreSession,
    table: &str,
    id_column: &str,
    column: &str,
    chunk_size: u64,
) -> Result<Option<f64>, ParityError> {
    let table_sql = SqlQuoter::ident(table);
    let id_sql = SqlQuoter::ident(id_column);
    let col_sql = SqlQuoter::ident(column);
    let mut total = session
        .number(&format!(
            "SELECT SUM({}) FROM {} WHERE {} IS NULL",
            col_sql, table_sql, id_sql
        ))
        .await?;
    let Some((min, max)) = id_bounds(session, &table_sql, &id_sql).await? else {
        return Ok(total);
    };

    for (start, end) in ChunkRanges::new(min, max, chunk_size) {
        let part = session
            .number(&format!(
                "SELECT SUM({}) FROM {} WHERE {} BETWEEN {} AND {}",
                col_sql, table_sql, id_sql, start, end
            ))
            .await?;
        if let Some(v) = part {
            total = Some(total.unwrap_or(0.0) + v);
        }
    }
    Ok(total)
}

/// Row count with automatic strategy choice: chunked when the catalog
/// estimate exceeds the threshold and no filter applies, direct otherwise.
pub async fn count_rows(
    session: &StoreSession,
    table: &str,
    id_column: &str,
    where_clause: Option<&str>,
    settings: &ChunkSettings,
) -> Result<CountResult, ParityError> {
    let table_sql = SqlQuoter::ident(table);

    if let Some(filter) = where_clause {
        let count = session
            .count(&format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                table_sql, filter
            ))
            .await?;
        return Ok(CountResult { count, chunks: 0 });
    }

    let estimate = match session.estimate_row_count(table).await {
        Ok(e) => e,
        Err(e) => {
            debug!(table, error = %e, "No row estimate, counting directly");
            None
        }
    };

    if estimate.is_some_and(|n| n > settings.threshold) {
        match chunked_count(session, table, id_column, settings.chunk_size).await {
            Ok(result) => return Ok(result),
            Err(e @ ParityError::Cancelled) => return Err(e),
            Err(e) => {
                warn!(table, id_column, error = %e, "Chunked count unavailable, falling back to direct count");
            }
        }
    }

    let count = session
        .count(&format!("SELECT COUNT(*) FROM {}", table_sql))
        .await?;
    Ok(CountResult { count, chunks: 0 })
}

// parity-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{AccessMode, Config, Connection};
use serde_json::{Number, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::domain::compiler::quoter::SqlQuoter;
use crate::error::ParityError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::connector::{Connector, Row, StoreDriver};

pub const MEMORY_PATH: &str = ":memory:";

fn db_err(e: duckdb::Error) -> ParityError {
    ParityError::Infrastructure(InfrastructureError::Database(DatabaseError::DuckDB(e)))
}

fn poisoned() -> ParityError {
    ParityError::Infrastructure(InfrastructureError::Io(std::io::Error::other(
        "DuckDB Mutex Poisoned",
    )))
}

/// Opens connections to one DuckDB database. The database handle is opened
/// lazily on the first successful attempt; every connection handed out after
/// that is a clone sharing the same instance.
pub struct DuckDbDriver {
    store: String,
    path: String,
    read_only: bool,
    base: Mutex<Option<Connection>>,
}

impl DuckDbDriver {
    pub fn new(store: impl Into<String>, path: impl Into<String>, read_only: bool) -> Self {
        Self {
            store: store.into(),
            path: path.into(),
            read_only,
            base: Mutex::new(None),
        }
    }

    /// Wraps an already open database (tests, embedded use).
    pub fn from_connection(store: impl Into<String>, conn: Connection) -> Self {
        Self {
            store: store.into(),
            path: MEMORY_PATH.to_string(),
            read_only: false,
            base: Mutex::new(Some(conn)),
        }
    }

    fn open_database(&self) -> Result<Connection, duckdb::Error> {
        if self.path == MEMORY_PATH {
            return Connection::open_in_memory();
        }
        let mut config = Config::default();
        if self.read_only {
            config = config.access_mode(AccessMode::ReadOnly)?;
        }
        Connection::open_with_flags(&self.path, config)
    }
}

#[async_trait]
impl StoreDriver for DuckDbDriver {
    async fn open(&self) -> Result<Box<dyn Connector>, ParityError> {
        let mut base = self.base.lock().map_err(|_| poisoned())?;
        if base.is_none() {
            let conn = self
                .open_database()
                .map_err(|e| ParityError::Connectivity {
                    store: self.store.clone(),
                    attempts: 1,
                    reason: e.to_string(),
                })?;
            info!(store = %self.store, path = %self.path, read_only = self.read_only, "Opened DuckDB database");
            *base = Some(conn);
        }
        let conn = match base.as_ref() {
            Some(c) => c.try_clone().map_err(|e| ParityError::Connectivity {
                store: self.store.clone(),
                attempts: 1,
                reason: e.to_string(),
            })?,
            None => return Err(ParityError::InternalError("DuckDB handle missing".into())),
        };
        Ok(Box::new(DuckDbConnector {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }
}

pub struct DuckDbConnector {
    conn: Arc<Mutex<Connection>>,
}

fn query_rows(conn: &Connection, query: &str) -> Result<Vec<Row>, ParityError> {
    let mut stmt = conn.prepare(query).map_err(db_err)?;
    let mut rows = stmt.query([]).map_err(db_err)?;
    let names: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(db_err)? {
        let mut record = Row::new();
        for (idx, name) in names.iter().enumerate() {
            let value: DuckValue = row.get(idx).map_err(db_err)?;
            record.insert(name.clone(), to_json(value));
        }
        out.push(record);
    }
    Ok(out)
}

fn query_scalar(conn: &Connection, query: &str) -> Result<Value, ParityError> {
    let mut stmt = conn.prepare(query).map_err(db_err)?;
    let mut rows = stmt.query([]).map_err(db_err)?;
    match rows.next().map_err(db_err)? {
        Some(row) => {
            let value: DuckValue = row.get(0).map_err(db_err)?;
            Ok(to_json(value))
        }
        None => Ok(Value::Null),
    }
}

impl DuckDbConnector {
    /// Runs `work` on the blocking pool so a long query yields to the runtime
    /// (cancellation, timeouts, other rules) instead of stalling it.
    async fn blocking<T, F>(&self, query: &str, work: F) -> Result<T, ParityError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, ParityError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| poisoned())?;
            work(&conn, &query)
        })
        .await
        .map_err(|e| ParityError::InternalError(format!("DuckDB worker failed: {e}")))?
    }
}

#[async_trait]
impl Connector for DuckDbConnector {
    async fn scalar(&self, query: &str) -> Result<Value, ParityError> {
        self.blocking(query, query_scalar).await
    }

    async fn rows(&self, query: &str) -> Result<Vec<Row>, ParityError> {
        self.blocking(query, query_rows).await
    }

    async fn execute(&self, statement: &str) -> Result<(), ParityError> {
        self.blocking(statement, |conn, sql| conn.execute_batch(sql).map_err(db_err))
            .await
    }

    async fn estimate_row_count(&self, table: &str) -> Result<Option<u64>, ParityError> {
        let (schema, name) = match table.rsplit_once('.') {
            Some((s, n)) => (Some(s), n),
            None => (None, table),
        };
        let mut query = format!(
            "SELECT estimated_size FROM duckdb_tables() WHERE table_name = {}",
            SqlQuoter::literal(name.trim_matches('"'))
        );
        if let Some(schema) = schema {
            query.push_str(&format!(
                " AND schema_name = {}",
                SqlQuoter::literal(schema.trim_matches('"'))
            ));
        }
        let estimate = self.scalar(&query).await?;
        debug!(table, ?estimate, "Catalog row estimate");
        Ok(estimate.as_u64().or_else(|| {
            estimate
                .as_i64()
                .and_then(|v| u64::try_from(v).ok())
        }))
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }
}

/// DuckDB value -> JSON. Exact decimals and wide integers become floats,
/// temporal types become ISO strings.
pub fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(v) => Value::from(v),
        DuckValue::SmallInt(v) => Value::from(v),
        DuckValue::Int(v) => Value::from(v),
        DuckValue::BigInt(v) => Value::from(v),
        DuckValue::UTinyInt(v) => Value::from(v),
        DuckValue::USmallInt(v) => Value::from(v),
        DuckValue::UInt(v) => Value::from(v),
        DuckValue::UBigInt(v) => Value::from(v),
        DuckValue::HugeInt(v) => match i64::try_from(v) {
            Ok(small) => Value::from(small),
            Err(_) => float(v as f64),
        },
        DuckValue::Float(v) => float(f64::from(v)),
        DuckValue::Double(v) => float(v),
        DuckValue::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(float)
            .unwrap_or_else(|_| Value::String(d.to_string())),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(days))))
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        DuckValue::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.naive_utc().to_string()))
                .unwrap_or(Value::Null)
        }
        DuckValue::List(items) => Value::Array(items.into_iter().map(to_json).collect()),
        other => Value::String(format!("{:?}", other)),
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn driver() -> Result<DuckDbDriver> {
        Ok(DuckDbDriver::from_connection(
            "target",
            Connection::open_in_memory()?,
        ))
    }

    #[tokio::test]
    async fn test_duckdb_flow() -> Result<()> {
        let driver = driver()?;
        let conn = driver.open().await?;
        conn.execute(
            "CREATE TABLE orders (id INTEGER, amount DECIMAL(10,2), placed DATE, note VARCHAR);
             INSERT INTO orders VALUES (1, 10.50, DATE '2024-01-02', 'a'), (2, NULL, NULL, NULL);",
        )
        .await?;

        assert_eq!(
            conn.scalar("SELECT COUNT(*) FROM orders").await?,
            Value::from(2)
        );

        let rows = conn.rows("SELECT * FROM orders ORDER BY id").await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["amount"], Value::from(10.5));
        assert_eq!(rows[0]["placed"], Value::from("2024-01-02"));
        assert_eq!(rows[1]["note"], Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn test_clones_share_the_database() -> Result<()> {
        let driver = driver()?;
        let a = driver.open().await?;
        let b = driver.open().await?;
        a.execute("CREATE TABLE t AS SELECT range AS id FROM range(10)")
            .await?;
        assert_eq!(b.scalar("SELECT MAX(id) FROM t").await?, Value::from(9));
        assert!(b.estimate_row_count("t").await?.is_some());
        assert_eq!(b.estimate_row_count("missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_scalar_on_empty_result_is_null() -> Result<()> {
        let conn = driver()?.open().await?;
        assert_eq!(conn.scalar("SELECT 1 WHERE 1 = 0").await?, Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn test_duckdb_error() -> Result<()> {
        let conn = driver()?.open().await?;
        let result = conn.scalar("SELECT * FROM non_existent_table").await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_read_only_file_is_connectivity_error() {
        let driver = DuckDbDriver::new("source", "/nonexistent/dir/db.duckdb", true);
        let res = driver.open().await;
        assert!(matches!(res, Err(ParityError::Connectivity { .. })));
    }
}

// parity-core/src/application/executor.rs

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::application::retry::{RetryPolicy, connect_with_retry};
use crate::error::ParityError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::connector::{Connector, Row, StoreDriver};

/// Bounded pool of connections to one named store.
///
/// Checkout is gated by a semaphore, so at most `size` sessions exist at once
/// and a connection is never shared between two concurrent evaluators.
pub struct ConnectionPool {
    store: String,
    driver: Arc<dyn StoreDriver>,
    idle: Mutex<Vec<Box<dyn Connector>>>,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(
        store: impl Into<String>,
        driver: Arc<dyn StoreDriver>,
        size: usize,
        policy: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: store.into(),
            driver,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(size.max(1))),
            policy,
            closed: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    fn closed_error(&self) -> ParityError {
        InfrastructureError::Database(DatabaseError::PoolClosed(self.store.clone())).into()
    }

    async fn open_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Connector>, ParityError> {
        connect_with_retry(&self.store, &self.policy, cancel, || self.driver.open()).await
    }

    /// Opens one connection (with retry) and parks it. Proves the store is reachable.
    #[instrument(skip(self, cancel), fields(store = %self.store))]
    pub async fn warm_up(&self, cancel: &CancellationToken) -> Result<(), ParityError> {
        let conn = self.open_with_retry(cancel).await?;
        self.release(conn);
        Ok(())
    }

    /// Checks out a session. The connection goes back to the pool when the
    /// session is dropped, whatever the exit path.
    pub async fn checkout(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<StoreSession, ParityError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(ParityError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| self.closed_error())?
            }
        };

        let parked = self
            .idle
            .lock()
            .map_err(|_| ParityError::InternalError("pool mutex poisoned".into()))?
            .pop();
        let conn = match parked {
            Some(conn) => conn,
            None => self.open_with_retry(cancel).await?,
        };

        Ok(StoreSession {
            store: self.store.clone(),
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    fn release(&self, conn: Box<dyn Connector>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Drops parked connections and refuses further checkouts.
    /// Sessions still out are dropped on return.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.permits.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }
}

/// A checked-out connection plus its pool slot.
///
/// All query errors are reported as [`ParityError::QueryExecution`] for this
/// store and are never retried.
pub struct StoreSession {
    store: String,
    conn: Option<Box<dyn Connector>>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl StoreSession {
    pub fn store(&self) -> &str {
        &self.store
    }

    fn connector(&self) -> Result<&dyn Connector, ParityError> {
        self.conn
            .as_deref()
            .ok_or_else(|| ParityError::InternalError("session already released".into()))
    }

    fn query_error(&self, err: ParityError) -> ParityError {
        match err {
            ParityError::QueryExecution { .. } | ParityError::Cancelled => err,
            other => ParityError::QueryExecution {
                store: self.store.clone(),
                reason: other.to_string(),
            },
        }
    }

    #[instrument(skip(self), fields(store = %self.store, query.len = query.len()))]
    pub async fn scalar(&self, query: &str) -> Result<Value, ParityError> {
        let start = Instant::now();
        debug!("Executing scalar: {}", query);
        match self.connector()?.scalar(query).await {
            Ok(v) => {
                debug!("Query finished in {:.2?}", start.elapsed());
                Ok(v)
            }
            Err(e) => {
                error!("Query failed after {:.2?}: {}", start.elapsed(), e);
                Err(self.query_error(e))
            }
        }
    }

    #[instrument(skip(self), fields(store = %self.store, query.len = query.len()))]
    pub async fn rows(&self, query: &str) -> Result<Vec<Row>, ParityError> {
        let start = Instant::now();
        debug!("Executing query: {}", query);
        match self.connector()?.rows(query).await {
            Ok(rows) => {
                debug!(rows = rows.len(), "Query finished in {:.2?}", start.elapsed());
                Ok(rows)
            }
            Err(e) => {
                error!("Query failed after {:.2?}: {}", start.elapsed(), e);
                Err(self.query_error(e))
            }
        }
    }

    pub async fn estimate_row_count(&self, table: &str) -> Result<Option<u64>, ParityError> {
        self.connector()?
            .estimate_row_count(table)
            .await
            .map_err(|e| self.query_error(e))
    }

    /// Scalar read as a non-negative integer; NULL counts as 0.
    pub async fn count(&self, query: &str) -> Result<u64, ParityError> {
        let value = self.scalar(query).await?;
        if value.is_null() {
            return Ok(0);
        }
        value_as_u64(&value).ok_or_else(|| ParityError::QueryExecution {
            store: self.store.clone(),
            reason: format!("expected a non-negative integer, got {}", value),
        })
    }

    /// Scalar read as a float; `None` for NULL.
    pub async fn number(&self, query: &str) -> Result<Option<f64>, ParityError> {
        let value = self.scalar(query).await?;
        if value.is_null() {
            return Ok(None);
        }
        value_as_f64(&value)
            .map(Some)
            .ok_or_else(|| ParityError::QueryExecution {
                store: self.store.clone(),
                reason: format!("expected a number, got {}", value),
            })
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Canned answers keyed by exact query text. Unknown queries fail like a
    /// missing table would.
    pub(crate) struct MockConnector {
        pub answers: HashMap<String, Value>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn scalar(&self, query: &str) -> Result<Value, ParityError> {
            self.answers
                .get(query)
                .cloned()
                .ok_or_else(|| ParityError::InternalError(format!("no such table in: {query}")))
        }
        async fn rows(&self, query: &str) -> Result<Vec<Row>, ParityError> {
            match self.answers.get(query) {
                Some(Value::Array(items)) => Ok(items
                    .iter()
                    .filter_map(|v| v.as_object().cloned())
                    .collect()),
                Some(other) => Ok(other.as_object().cloned().into_iter().collect()),
                None => Err(ParityError::InternalError(format!("no such table in: {query}"))),
            }
        }
        async fn execute(&self, _statement: &str) -> Result<(), ParityError> {
            Ok(())
        }
        async fn estimate_row_count(&self, _table: &str) -> Result<Option<u64>, ParityError> {
            Ok(None)
        }
        fn engine_name(&self) -> &str {
            "mock"
        }
    }

    pub(crate) struct MockDriver {
        pub answers: HashMap<String, Value>,
        pub failures_before_success: u32,
        pub opened: AtomicU32,
    }

    impl MockDriver {
        pub fn new(answers: HashMap<String, Value>) -> Self {
            Self {
                answers,
                failures_before_success: 0,
                opened: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl StoreDriver for MockDriver {
        async fn open(&self) -> Result<Box<dyn Connector>, ParityError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                return Err(ParityError::Connectivity {
                    store: "mock".into(),
                    attempts: 1,
                    reason: "still starting up".into(),
                });
            }
            Ok(Box::new(MockConnector {
                answers: self.answers.clone(),
            }))
        }
        fn engine_name(&self) -> &str {
            "mock"
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_session_returns_connection_on_drop() -> anyhow::Result<()> {
        let driver = Arc::new(MockDriver::new(HashMap::from([(
            "SELECT 1".to_string(),
            Value::from(1),
        )])));
        let pool = ConnectionPool::new("target", driver.clone(), 2, quick());
        let cancel = CancellationToken::new();

        {
            let session = pool.checkout(&cancel).await?;
            assert_eq!(session.count("SELECT 1").await?, 1);
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let _again = pool.checkout(&cancel).await?;
        assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_errors_are_tagged_with_store() -> anyhow::Result<()> {
        let pool = ConnectionPool::new(
            "target",
            Arc::new(MockDriver::new(HashMap::new())),
            1,
            quick(),
        );
        let session = pool.checkout(&CancellationToken::new()).await?;
        let err = session.scalar("SELECT * FROM nope").await.unwrap_err();
        assert!(matches!(err, ParityError::QueryExecution { ref store, .. } if store == "target"));
        Ok(())
    }

    #[tokio::test]
    async fn test_warm_up_retries_slow_store() -> anyhow::Result<()> {
        let driver = Arc::new(MockDriver {
            failures_before_success: 2,
            ..MockDriver::new(HashMap::new())
        });
        let pool = ConnectionPool::new("source", driver.clone(), 1, quick());
        pool.warm_up(&CancellationToken::new()).await?;
        assert_eq!(driver.opened.load(Ordering::SeqCst), 3);
        assert_eq!(pool.idle_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_checkout() {
        let pool = ConnectionPool::new(
            "target",
            Arc::new(MockDriver::new(HashMap::new())),
            1,
            quick(),
        );
        pool.close();
        assert!(pool.checkout(&CancellationToken::new()).await.is_err());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(value_as_u64(&Value::from(3)), Some(3));
        assert_eq!(value_as_u64(&Value::from(3.0)), Some(3));
        assert_eq!(value_as_u64(&Value::from(-1)), None);
        assert_eq!(value_as_u64(&Value::from("42")), Some(42));
        assert_eq!(value_as_f64(&Value::from("250.005")), Some(250.005));
        assert_eq!(value_as_i64(&Value::from(-7)), Some(-7));
    }
}

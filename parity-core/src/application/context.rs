// parity-core/src/application/context.rs

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::application::executor::{ConnectionPool, StoreSession};
use crate::application::retry::RetryPolicy;
use crate::domain::compliance::tolerance::DEFAULT_EPSILON;
use crate::error::ParityError;
use crate::infrastructure::adapters::DuckDbDriver;
use crate::infrastructure::config::{ChunkSettings, ProjectSettings, StoreEngine};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::connector::StoreDriver;

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub pool_size: usize,
    /// Per-store pool size, when a store sets its own.
    pub pool_overrides: BTreeMap<String, usize>,
    pub retry: RetryPolicy,
    pub chunking: ChunkSettings,
    /// Default epsilon for the run (a rule's own epsilon wins).
    pub epsilon: f64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            pool_overrides: BTreeMap::new(),
            retry: RetryPolicy::default(),
            chunking: ChunkSettings::default(),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl ContextOptions {
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        Self {
            pool_size: settings.run.max_parallel,
            pool_overrides: settings
                .stores
                .iter()
                .filter_map(|(name, store)| store.pool_size.map(|n| (name.clone(), n)))
                .collect(),
            retry: RetryPolicy::from(&settings.retry),
            chunking: settings.chunking,
            epsilon: settings.epsilon,
        }
    }
}

#[derive(Debug, Clone)]
struct Unavailable {
    attempts: u32,
    reason: String,
}

/// Everything one run needs to reach its stores. Created at run start,
/// closed at run end (or on drop); nothing here is process-global.
pub struct RunContext {
    pools: HashMap<String, Arc<ConnectionPool>>,
    unavailable: BTreeMap<String, Unavailable>,
    options: ContextOptions,
    cancel: CancellationToken,
}

/// One driver per declared store, as configured.
pub fn drivers_from_settings(
    project_dir: &Path,
    settings: &ProjectSettings,
) -> Vec<(String, Arc<dyn StoreDriver>)> {
    settings
        .stores
        .iter()
        .map(|(name, store)| {
            let driver: Arc<dyn StoreDriver> = match store.engine {
                StoreEngine::Duckdb => Arc::new(DuckDbDriver::new(
                    name.clone(),
                    settings.resolved_store_path(project_dir, store),
                    store.read_only,
                )),
            };
            (name.clone(), driver)
        })
        .collect()
}

impl RunContext {
    /// Warms every store concurrently (with retry). Stores that stay down are
    /// remembered so rules touching them report ERROR; if none comes up the
    /// run cannot start and the connectivity error is returned.
    #[instrument(skip_all, fields(stores = drivers.len()))]
    pub async fn open(
        drivers: Vec<(String, Arc<dyn StoreDriver>)>,
        options: ContextOptions,
        cancel: CancellationToken,
    ) -> Result<Self, ParityError> {
        let pools: HashMap<String, Arc<ConnectionPool>> = drivers
            .into_iter()
            .map(|(name, driver)| {
                let size = options
                    .pool_overrides
                    .get(&name)
                    .copied()
                    .unwrap_or(options.pool_size);
                let pool = ConnectionPool::new(name.clone(), driver, size, options.retry.clone());
                (name, pool)
            })
            .collect();

        let warmups = pools.values().map(|pool| {
            let cancel = cancel.clone();
            let pool = Arc::clone(pool);
            async move { (pool.store().to_string(), pool.warm_up(&cancel).await) }
        });
        let results = join_all(warmups).await;

        let mut unavailable = BTreeMap::new();
        let mut first_failure = None;
        for (store, result) in results {
            match result {
                Ok(()) => info!(store = %store, "Store reachable"),
                Err(ParityError::Cancelled) => return Err(ParityError::Cancelled),
                Err(e) => {
                    let (attempts, reason) = match &e {
                        ParityError::Connectivity {
                            attempts, reason, ..
                        } => (*attempts, reason.clone()),
                        other => (1, other.to_string()),
                    };
                    warn!(store = %store, attempts, %reason, "Store unreachable");
                    unavailable.insert(store, Unavailable { attempts, reason });
                    first_failure.get_or_insert(e);
                }
            }
        }

        if !pools.is_empty() && unavailable.len() == pools.len() {
            error!("No store reachable, aborting run");
            for pool in pools.values() {
                pool.close();
            }
            return Err(first_failure
                .unwrap_or_else(|| ParityError::InternalError("no store reachable".into())));
        }

        Ok(Self {
            pools,
            unavailable,
            options,
            cancel,
        })
    }

    /// Checks out a session on `store`. Fails fast for stores that were
    /// unreachable at startup.
    pub async fn connect(&self, store: &str) -> Result<StoreSession, ParityError> {
        if let Some(down) = self.unavailable.get(store) {
            return Err(ParityError::Connectivity {
                store: store.to_string(),
                attempts: down.attempts,
                reason: down.reason.clone(),
            });
        }
        let pool = self
            .pools
            .get(store)
            .ok_or_else(|| InfrastructureError::UnknownStore(store.to_string()))?;
        pool.checkout(&self.cancel).await
    }

    pub fn is_available(&self, store: &str) -> bool {
        self.pools.contains_key(store) && !self.unavailable.contains_key(store)
    }

    pub fn unavailable_stores(&self) -> Vec<&str> {
        self.unavailable.keys().map(String::as_str).collect()
    }

    pub fn chunking(&self) -> ChunkSettings {
        self.options.chunking
    }

    pub fn default_epsilon(&self) -> f64 {
        self.options.epsilon
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Releases every pooled connection. Idempotent.
    pub fn close(&self) {
        for pool in self.pools.values() {
            pool.close();
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::application::executor::tests::MockDriver;
    use std::time::Duration;

    fn options() -> ContextOptions {
        ContextOptions {
            retry: RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                multiplier: 1.0,
            },
            ..Default::default()
        }
    }

    fn down() -> Arc<dyn StoreDriver> {
        Arc::new(MockDriver {
            failures_before_success: u32::MAX,
            ..MockDriver::new(HashMap::new())
        })
    }

    fn up() -> Arc<dyn StoreDriver> {
        Arc::new(MockDriver::new(HashMap::new()))
    }

    #[tokio::test]
    async fn test_all_stores_down_is_fatal() {
        let res = RunContext::open(
            vec![("source".into(), down()), ("target".into(), down())],
            options(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            res,
            Err(ParityError::Connectivity { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_partial_outage_is_scoped_to_the_store() -> anyhow::Result<()> {
        let ctx = RunContext::open(
            vec![("source".into(), down()), ("target".into(), up())],
            options(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(ctx.unavailable_stores(), vec!["source"]);
        assert!(ctx.is_available("target"));
        assert!(ctx.connect("target").await.is_ok());
        assert!(matches!(
            ctx.connect("source").await,
            Err(ParityError::Connectivity { .. })
        ));
        assert!(matches!(
            ctx.connect("elsewhere").await,
            Err(ParityError::Infrastructure(InfrastructureError::UnknownStore(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_close_releases_pools() -> anyhow::Result<()> {
        let ctx = RunContext::open(
            vec![("target".into(), up())],
            options(),
            CancellationToken::new(),
        )
        .await?;
        ctx.close();
        assert!(ctx.connect("target").await.is_err());
        Ok(())
    }
}

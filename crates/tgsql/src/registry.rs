//! Connection registry: one pool per data source, created on first use.

use crate::builder::QueryBuilder;
use crate::client::GenericClient;
use crate::config::{DataSource, DatabaseConfig};
use crate::error::{DbError, DbResult};
use crate::transaction::Transaction;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime, Timeouts};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Reaper period when only `max_idle` is limited.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Shared handle to one pooled data source.
///
/// Cloning is cheap; every clone refers to the same pool.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    pool: Pool,
    source: DataSource,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.inner.source.key())
            .field("status", &self.inner.pool.status())
            .finish()
    }
}

impl ConnectionHandle {
    /// Build the pool for `source` without touching the network.
    ///
    /// Handles opened this way are not cached; use [`Registry::resolve`] to
    /// share one pool per connection string.
    pub fn open(source: &DataSource) -> DbResult<Self> {
        let mut pg_config: tokio_postgres::Config = source
            .url
            .parse()
            .map_err(|e: tokio_postgres::Error| DbError::Connection(e.to_string()))?;
        if let Some(limit) = source.connect_limit() {
            pg_config.connect_timeout(limit);
        }

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(source.max_open)
            .runtime(Runtime::Tokio1)
            .timeouts(Timeouts {
                wait: source.wait(),
                // Covers the startup handshake too, which connect_timeout does not.
                create: source.connect_limit(),
                ..Timeouts::default()
            })
            .build()
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(HandleInner {
                pool,
                source: source.clone(),
            }),
        })
    }

    /// The data source this handle was created from (first writer wins).
    pub fn source(&self) -> &DataSource {
        &self.inner.source
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    /// Check out a pooled client for hand-written SQL.
    pub async fn client(&self) -> DbResult<deadpool_postgres::Client> {
        self.inner
            .pool
            .get()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }

    /// Whether two handles share one pool.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Start a query builder for `table`.
    pub fn table(&self, table: &str) -> QueryBuilder<'static> {
        QueryBuilder::on_pool(table, self.clone())
    }

    /// Open a transaction on a connection pinned from this pool.
    pub async fn begin(&self) -> DbResult<Transaction> {
        Transaction::begin(self).await
    }

    /// Run [`evict_idle`](Self::evict_idle) periodically while the pool is alive,
    /// if the source asks for any idle or lifetime limit.
    fn spawn_reaper(&self) {
        let source = &self.inner.source;
        let limits = [source.idle_lifetime(), source.total_lifetime()];
        let period = match limits.into_iter().flatten().min() {
            Some(d) => d.max(Duration::from_secs(1)),
            None if source.max_idle < source.max_open => REAP_INTERVAL,
            None => return,
        };

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                ConnectionHandle { inner }.evict_idle();
            }
        });
    }

    /// Drop idle connections past their idle or total lifetime and trim the
    /// idle set to `max_idle`. Pools resolved through the registry run this
    /// periodically.
    pub fn evict_idle(&self) {
        let source = &self.inner.source;
        let idle_limit = source.idle_lifetime();
        let life_limit = source.total_lifetime();
        let max_idle = source.max_idle;
        let kept = Cell::new(0usize);
        let result = self.inner.pool.retain(|_, metrics| {
            if idle_limit.is_some_and(|d| metrics.last_used() > d) {
                return false;
            }
            if life_limit.is_some_and(|d| metrics.age() > d) {
                return false;
            }
            kept.set(kept.get() + 1);
            kept.get() <= max_idle
        });
        if !result.removed.is_empty() {
            tracing::debug!(
                removed = result.removed.len(),
                retained = result.retained,
                "evicted idle connections"
            );
        }
    }
}

impl GenericClient for ConnectionHandle {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        let client = self.inner.pool.get().await?;
        GenericClient::query(&client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        let client = self.inner.pool.get().await?;
        GenericClient::execute(&client, sql, params).await
    }
}

/// Process-wide map from connection string to pool.
///
/// Construct one at startup and share it (`Arc<Registry>` or a field of the
/// application state); it is the only owner of pools.
pub struct Registry {
    default: DataSource,
    named: HashMap<String, DataSource>,
    handles: RwLock<HashMap<String, ConnectionHandle>>,
}

impl Registry {
    /// Create a registry whose default source is `default`.
    pub fn new(default: DataSource) -> Self {
        Self {
            default,
            named: HashMap::new(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry from a loaded `[database]` config section.
    pub fn from_config(config: DatabaseConfig) -> Self {
        Self {
            default: config.default,
            named: config.sources.into_iter().collect(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// The default data source.
    pub fn default_source(&self) -> &DataSource {
        &self.default
    }

    /// A named data source from configuration.
    pub fn source(&self, name: &str) -> DbResult<&DataSource> {
        self.named
            .get(name)
            .ok_or_else(|| DbError::Config(format!("unknown data source '{name}'")))
    }

    /// Return the handle for `source`, creating and verifying its pool on first use.
    ///
    /// A second call with the same connection string returns the cached handle
    /// and ignores the pool settings it was given. The pool is built and verified
    /// without holding the cache lock, so a slow or unreachable server only
    /// delays its own callers; if two callers race, the first insert wins and
    /// the other pool is dropped.
    pub async fn resolve(&self, source: &DataSource) -> DbResult<ConnectionHandle> {
        let key = source.key();
        if let Some(handle) = self.handles.read().await.get(key) {
            return Ok(handle.clone());
        }

        let handle = ConnectionHandle::open(source)?;
        // Fail fast on an unreachable server instead of on the first statement.
        let first = handle.client().await?;
        drop(first);

        let mut handles = self.handles.write().await;
        if let Some(existing) = handles.get(key) {
            return Ok(existing.clone());
        }
        handles.insert(key.to_string(), handle.clone());
        drop(handles);

        handle.spawn_reaper();
        tracing::debug!(
            max_open = source.max_open,
            max_idle = source.max_idle,
            "opened connection pool"
        );
        Ok(handle)
    }

    /// Handle for the default data source.
    pub async fn default_handle(&self) -> DbResult<ConnectionHandle> {
        self.resolve(&self.default).await
    }

    /// Start a query builder for `table` on the default data source.
    pub async fn table(&self, table: &str) -> DbResult<QueryBuilder<'static>> {
        Ok(self.default_handle().await?.table(table))
    }

    /// Start a query builder for `table` on a specific data source.
    pub async fn table_with(
        &self,
        table: &str,
        source: &DataSource,
    ) -> DbResult<QueryBuilder<'static>> {
        Ok(self.resolve(source).await?.table(table))
    }

    /// Begin a transaction on the default data source.
    pub async fn begin_transaction(&self) -> DbResult<Transaction> {
        self.default_handle().await?.begin().await
    }

    /// Begin a transaction on a specific data source.
    pub async fn begin_transaction_with(&self, source: &DataSource) -> DbResult<Transaction> {
        self.resolve(source).await?.begin().await
    }

    /// Number of pools created so far.
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Run idle eviction on every pool.
    pub async fn evict_idle(&self) {
        for handle in self.handles.read().await.values() {
            handle.evict_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_a_connection_error() {
        let registry = Registry::new(DataSource::new("postgres://localhost:notaport/db"));
        let err = registry.default_handle().await.unwrap_err();
        assert!(matches!(err, DbError::Connection(_)));
        assert!(err.is_fatal());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_named_source() {
        let registry = Registry::new(DataSource::new("postgres://localhost/app"));
        assert!(matches!(registry.source("reporting"), Err(DbError::Config(_))));
    }

    /// Accepts TCP connections and never answers the startup message.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("postgres://app@{addr}/app"), task)
    }

    #[tokio::test]
    async fn pending_first_use_does_not_block_other_callers() {
        let (url, server) = silent_server().await;
        let source = DataSource::new(url).connect_timeout(Duration::from_secs(30));
        let registry = Arc::new(Registry::new(source));

        let pending = tokio::spawn({
            let registry = registry.clone();
            async move { registry.default_handle().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let len = tokio::time::timeout(Duration::from_secs(3), registry.len()).await;
        assert_eq!(len.ok(), Some(0));

        let malformed = DataSource::new("postgres://localhost:notaport/db");
        let other =
            tokio::time::timeout(Duration::from_secs(3), registry.resolve(&malformed)).await;
        assert!(matches!(other, Ok(Err(DbError::Connection(_)))));

        pending.abort();
        server.abort();
    }

    #[tokio::test]
    async fn silent_server_is_a_connection_error() {
        let (url, server) = silent_server().await;
        let registry = Registry::new(DataSource::new(url).connect_timeout(Duration::from_secs(1)));

        let resolved =
            tokio::time::timeout(Duration::from_secs(10), registry.default_handle()).await;
        let err = resolved.expect("resolve finished").unwrap_err();
        assert!(matches!(err, DbError::Connection(_)));
        assert!(err.is_fatal());
        assert!(registry.is_empty().await);

        server.abort();
    }

    #[test]
    fn open_applies_pool_size() {
        let source = DataSource::new("postgres://app@localhost/app").max_open(3);
        let handle = ConnectionHandle::open(&source).unwrap();
        assert_eq!(handle.pool().status().max_size, 3);
        assert!(handle.ptr_eq(&handle.clone()));

        let other = ConnectionHandle::open(&source).unwrap();
        assert!(!handle.ptr_eq(&other));
    }
}

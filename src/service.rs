//! Query Service
//!
//! The process-scoped handle: one executor, one runner, one prober, built
//! once at startup and shut down explicitly. Everything that needs to run
//! SQL receives a `QueryService` instead of reaching for global state.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, ConfigError, ExecutionConfig};
use crate::connection::{ConnectionError, ConnectionProvider, HttpConnectionProvider};
use crate::execution::{BoundedRunner, CacheStats, MemoizedExecutor, ProbeError, SchemaProber};
use crate::result::QueryResult;

#[derive(Clone)]
pub struct QueryService {
    executor: Arc<MemoizedExecutor>,
    runner: BoundedRunner,
    prober: SchemaProber,
}

impl QueryService {
    /// Assemble the service around any connection provider.
    pub fn new(provider: Arc<dyn ConnectionProvider>, execution: &ExecutionConfig) -> Self {
        let executor = Arc::new(MemoizedExecutor::new(provider, execution.cache_capacity));
        let runner = BoundedRunner::new(
            Arc::clone(&executor),
            execution.pool_size,
            execution.query_timeout(),
            execution.max_queued,
        );
        let prober = SchemaProber::new(Arc::clone(&executor));
        Self {
            executor,
            runner,
            prober,
        }
    }

    /// Validate the configuration and connect over HTTP.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let connection = config.connection_config()?;
        let provider: Arc<dyn ConnectionProvider> =
            Arc::new(HttpConnectionProvider::new(connection));
        Ok(Self::new(provider, &config.execution))
    }

    /// Memoized execution with no deadline.
    pub async fn execute(&self, query: &str) -> Result<QueryResult, ConnectionError> {
        self.executor.execute(query).await
    }

    /// Pool-bounded execution with the configured deadline.
    pub async fn run(&self, query: &str) -> Result<QueryResult, ConnectionError> {
        self.runner.run(query).await
    }

    pub async fn run_with_timeout(
        &self,
        query: &str,
        deadline: Duration,
    ) -> Result<QueryResult, ConnectionError> {
        self.runner.run_with_timeout(query, deadline).await
    }

    pub async fn exists(&self, entity: &str) -> bool {
        self.prober.exists(entity).await
    }

    pub async fn probe(&self, entity: &str) -> Result<bool, ProbeError> {
        self.prober.probe(entity).await
    }

    /// Drain the runner. Returns once no query is queued or running.
    pub async fn shutdown(&self) {
        self.runner.shutdown().await;
        let stats = self.cache_stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            coalesced = stats.coalesced,
            evictions = stats.evictions,
            size = stats.size,
            hit_rate = stats.hit_rate(),
            "Query cache at shutdown"
        );
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.executor.cache_stats()
    }

    pub fn executor(&self) -> &Arc<MemoizedExecutor> {
        &self.executor
    }

    pub fn runner(&self) -> &BoundedRunner {
        &self.runner
    }
}

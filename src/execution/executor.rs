//! Memoized Executor
//!
//! Runs finished SQL text read-only and memoizes the outcome by exact text.
//! Identical text never executes twice while its cache entry survives.

use std::sync::Arc;
use tracing::{debug, error};

use super::cache::{CacheStats, Lookup, QueryCache};
use crate::connection::{ConnectionError, ConnectionProvider, QuerySettings};
use crate::result::{QueryFailure, QueryResult};

/// First line of every statement sent to the server
pub const QUERY_HEADER: &str = "-- MCP CLICKHOUSE QUERY";
/// Last line of every statement sent to the server
pub const QUERY_FOOTER: &str = "-- END MCP CLICKHOUSE QUERY";

/// Surround a query with the traceability comments.
pub fn wrap_query(query: &str) -> String {
    format!("{QUERY_HEADER}\n{query}\n{QUERY_FOOTER}\n")
}

pub struct MemoizedExecutor {
    provider: Arc<dyn ConnectionProvider>,
    cache: QueryCache,
}

impl MemoizedExecutor {
    pub fn new(provider: Arc<dyn ConnectionProvider>, cache_capacity: usize) -> Self {
        Self {
            provider,
            cache: QueryCache::new(cache_capacity),
        }
    }

    /// Execute `query`, or return its memoized result.
    ///
    /// Server-side failures come back as [`QueryFailure::Execution`] and are
    /// cached. Only a failure to connect is returned as `Err`; it is not
    /// cached, so the next call tries again.
    pub async fn execute(&self, query: &str) -> Result<QueryResult, ConnectionError> {
        let flight = match self.cache.lookup(query) {
            Lookup::Hit(result) => {
                debug!(query_len = query.len(), "cache_hit");
                return Ok(result);
            }
            Lookup::Miss(flight) => flight,
        };

        let outcome = flight
            .get_or_try_init(|| async {
                let result = self.run_uncached(query).await?;
                self.cache.complete(query, &flight, result.clone());
                Ok::<_, ConnectionError>(result)
            })
            .await;

        match outcome {
            Ok(result) => Ok(result.clone()),
            Err(e) => {
                self.cache.abandon(query, &flight);
                Err(e)
            }
        }
    }

    async fn run_uncached(&self, query: &str) -> Result<QueryResult, ConnectionError> {
        let conn = self.provider.connect().await?;
        let settings = QuerySettings::read_only();
        let sql = wrap_query(query);
        debug!(
            query_id = settings.query_id.as_deref().unwrap_or_default(),
            server_version = conn.server_version(),
            "executing query"
        );

        match conn.query(&sql, &settings).await {
            Ok(table) => Ok(QueryResult::table(table)),
            Err(e) => {
                error!(
                    query_id = settings.query_id.as_deref().unwrap_or_default(),
                    error = %e,
                    "Error executing query"
                );
                Ok(QueryResult::Failed(QueryFailure::Execution(e.to_string())))
            }
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

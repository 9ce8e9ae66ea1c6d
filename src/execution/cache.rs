//! Query Cache Module
//!
//! Memoizes query results by exact query text.
//!
//! ## Design
//!
//! Uses LRU (Least Recently Used) eviction with a fixed capacity and no TTL:
//! an entry lives until it is evicted. Failed
//! executions are stored like successes.
//!
//! Queries that are currently executing are tracked in a separate in-flight
//! map, so a key is only ever present in the LRU once its execution has
//! completed. Concurrent callers of the same query share one
//! [`OnceCell`], which makes execution single-flight.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::result::QueryResult;

/// Default number of memoized results
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Shared slot for an in-flight execution
pub(crate) type Flight = Arc<OnceCell<QueryResult>>;

/// Outcome of a cache lookup
pub(crate) enum Lookup {
    /// Completed result
    Hit(QueryResult),
    /// Not cached; join (or lead) this flight
    Miss(Flight),
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,

    /// Number of lookups that started a new execution
    pub misses: usize,

    /// Number of lookups that joined an execution already in flight
    pub coalesced: usize,

    /// Number of entries evicted
    pub evictions: usize,

    /// Number of entries currently in cache
    pub size: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0); coalesced lookups count as hits
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.coalesced + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.coalesced) as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: LruCache<String, QueryResult>,
    in_flight: HashMap<String, Flight>,
    stats: CacheStats,
}

/// Thread-safe LRU memo of query results.
///
/// The lock is held only for map operations, never across an `.await`.
pub struct QueryCache {
    state: Mutex<CacheState>,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` results (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        QueryCache {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Check for a completed result without touching recency or stats
    pub fn contains(&self, query: &str) -> bool {
        self.state.lock().entries.contains(query)
    }

    /// Return the cached result, or the flight to await for it.
    pub(crate) fn lookup(&self, query: &str) -> Lookup {
        let mut state = self.state.lock();
        if let Some(result) = state.entries.get(query).cloned() {
            state.stats.hits += 1;
            return Lookup::Hit(result);
        }
        if let Some(flight) = state.in_flight.get(query).cloned() {
            state.stats.coalesced += 1;
            debug!(query_len = query.len(), "cache_join");
            return Lookup::Miss(flight);
        }
        let flight: Flight = Arc::new(OnceCell::new());
        state.in_flight.insert(query.to_string(), Arc::clone(&flight));
        state.stats.misses += 1;
        debug!(query_len = query.len(), "cache_miss");
        Lookup::Miss(flight)
    }

    /// Publish the result of a finished flight.
    pub(crate) fn complete(&self, query: &str, flight: &Flight, result: QueryResult) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(query)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            state.in_flight.remove(query);
        }
        if let Some((evicted, _)) = state.entries.push(query.to_string(), result) {
            if evicted != query {
                state.stats.evictions += 1;
            }
        }
        state.stats.size = state.entries.len();
    }

    /// Forget a flight that ended without a result.
    pub(crate) fn abandon(&self, query: &str, flight: &Flight) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(query)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            state.in_flight.remove(query);
        }
    }

    /// Get the number of completed entries
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    /// Number of executions currently in flight
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{QueryFailure, Table};

    fn failed(msg: &str) -> QueryResult {
        QueryResult::Failed(QueryFailure::Execution(msg.to_string()))
    }

    // Run a whole flight for `query` and publish `result`.
    fn fill(cache: &QueryCache, query: &str, result: QueryResult) {
        let Lookup::Miss(flight) = cache.lookup(query) else {
            panic!("expected miss for {query}");
        };
        cache.complete(query, &flight, result);
    }

    fn hit(cache: &QueryCache, query: &str) -> Option<QueryResult> {
        match cache.lookup(query) {
            Lookup::Hit(result) => Some(result),
            Lookup::Miss(flight) => {
                cache.abandon(query, &flight);
                None
            }
        }
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = QueryCache::new(100);

        assert!(hit(&cache, "test query").is_none());
        assert_eq!(cache.stats().hits, 0);

        fill(&cache, "test query", QueryResult::table(Table::empty()));

        assert!(hit(&cache, "test query").is_some());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn test_cache_eviction() {
        let cache = QueryCache::new(2);

        fill(&cache, "query1", failed("1"));
        fill(&cache, "query2", failed("2"));

        // Access query1 to make it more recent
        assert!(hit(&cache, "query1").is_some());

        // Add third entry - should evict query2 (LRU)
        fill(&cache, "query3", failed("3"));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("query1"));
        assert!(!cache.contains("query2"));
        assert!(cache.contains("query3"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_contains_does_not_touch_recency() {
        let cache = QueryCache::new(2);
        fill(&cache, "query1", failed("1"));
        fill(&cache, "query2", failed("2"));

        assert!(cache.contains("query1"));
        fill(&cache, "query3", failed("3"));

        assert!(!cache.contains("query1"));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_lookup_registers_single_flight() {
        let cache = QueryCache::new(10);

        let first = match cache.lookup("q") {
            Lookup::Miss(f) => f,
            Lookup::Hit(_) => panic!("empty cache cannot hit"),
        };
        let second = match cache.lookup("q") {
            Lookup::Miss(f) => f,
            Lookup::Hit(_) => panic!("not complete yet"),
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.in_flight(), 1);
        // In-flight keys are not cache entries
        assert!(!cache.contains("q"));

        cache.complete("q", &first, failed("boom"));
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(hit(&cache, "q"), Some(failed("boom")));

        let stats = cache.stats();
        assert_eq!((stats.misses, stats.coalesced, stats.hits), (1, 1, 1));
    }

    #[test]
    fn test_abandon_clears_flight_only_if_current() {
        let cache = QueryCache::new(10);
        let Lookup::Miss(old) = cache.lookup("q") else {
            panic!("expected miss");
        };
        cache.abandon("q", &old);
        assert_eq!(cache.in_flight(), 0);

        let Lookup::Miss(new) = cache.lookup("q") else {
            panic!("expected miss");
        };
        // A stale flight must not remove its replacement
        cache.abandon("q", &old);
        assert_eq!(cache.in_flight(), 1);
        cache.abandon("q", &new);
        assert_eq!(cache.in_flight(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 50,
            coalesced: 25,
            misses: 25,
            ..Default::default()
        };

        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
        assert!((CacheStats::default().hit_rate()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let cache = QueryCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}

//! Memoized Executor Tests
//!
//! Tests for:
//! - Memoization by exact query text
//! - Cached failures
//! - Read-only enforcement and the traceability wrapper
//! - Single execution under concurrent identical calls
//! - LRU eviction
//! - Connection failures bypassing the cache

mod common;

use common::MockClickHouse;
use mcp_clickhouse::{wrap_query, MemoizedExecutor, QueryFailure, QueryResult};
use std::sync::Arc;
use std::time::Duration;

fn executor(mock: &MockClickHouse, capacity: usize) -> Arc<MemoizedExecutor> {
    Arc::new(MemoizedExecutor::new(mock.provider(), capacity))
}

// ============================================================================
// Memoization
// ============================================================================

#[tokio::test]
async fn test_identical_text_executes_once() {
    let mock = MockClickHouse::with_people();
    let executor = executor(&mock, 128);

    let first = executor.execute("SELECT * FROM db.t").await.unwrap();
    let second = executor.execute("SELECT * FROM db.t").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.executions("SELECT * FROM db.t"), 1);
    assert_eq!(mock.connects(), 1);
}

#[tokio::test]
async fn test_hit_shares_rows() {
    let mock = MockClickHouse::with_people();
    let executor = executor(&mock, 128);

    let first = executor.execute("SELECT * FROM db.t").await.unwrap();
    let second = executor.execute("SELECT * FROM db.t").await.unwrap();

    match (first, second) {
        (QueryResult::Table(a), QueryResult::Table(b)) => assert!(Arc::ptr_eq(&a, &b)),
        other => panic!("expected two tables, got {other:?}"),
    }
}

#[tokio::test]
async fn test_execution_errors_are_cached() {
    let mock = MockClickHouse::new();
    let executor = executor(&mock, 128);

    let first = executor.execute("SELECT * FROM db.missing").await.unwrap();
    let second = executor.execute("SELECT * FROM db.missing").await.unwrap();

    assert_eq!(first, second);
    match first {
        QueryResult::Failed(QueryFailure::Execution(message)) => {
            assert!(message.contains("UNKNOWN_TABLE"), "{message}");
        }
        other => panic!("expected execution failure, got {other:?}"),
    }
    assert_eq!(mock.executions("SELECT * FROM db.missing"), 1);
}

#[tokio::test]
async fn test_failure_message_prefix() {
    let mock = MockClickHouse::new();
    let executor = executor(&mock, 128);

    let result = executor.execute("SELECT * FROM db.missing").await.unwrap();
    assert!(result
        .to_display_text()
        .starts_with("error running query: Code: 60."));
}

// ============================================================================
// Read-only and wrapping
// ============================================================================

#[tokio::test]
async fn test_writes_rejected_by_readonly() {
    let mock = MockClickHouse::with_people();
    let executor = executor(&mock, 128);

    let result = executor
        .execute("INSERT INTO db.t VALUES (3, 'Carol')")
        .await
        .unwrap();

    let text = result.to_display_text();
    assert!(text.starts_with("error running query: "), "{text}");
    assert!(text.contains("readonly"), "{text}");

    let rows = executor.execute("SELECT * FROM db.t").await.unwrap();
    assert_eq!(rows.as_table().unwrap().row_count(), 2);
}

#[tokio::test]
async fn test_statement_is_wrapped() {
    let mock = MockClickHouse::new();
    let executor = executor(&mock, 128);

    executor.execute("SELECT 42").await.unwrap();

    assert_eq!(mock.raw_sql(), vec![wrap_query("SELECT 42")]);
    assert_eq!(
        mock.raw_sql()[0],
        "-- MCP CLICKHOUSE QUERY\nSELECT 42\n-- END MCP CLICKHOUSE QUERY\n"
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_calls_execute_once() {
    let mock = MockClickHouse::with_people();
    mock.set_delay("SELECT * FROM db.t", Duration::from_secs(2));
    let executor = executor(&mock, 128);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let executor = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            executor.execute("SELECT * FROM db.t").await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(mock.executions("SELECT * FROM db.t"), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));

    let stats = executor.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits + stats.coalesced, 7);
    assert_eq!(executor.cache().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_queries_run_independently() {
    let mock = MockClickHouse::new();
    mock.set_default_delay(Duration::from_secs(1));
    let executor = executor(&mock, 128);

    let a = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.execute("SELECT 1").await.unwrap() })
    };
    let b = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.execute("SELECT 2").await.unwrap() })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_ne!(a, b);
    assert_eq!(mock.total_executions(), 2);
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn test_least_recently_used_is_evicted() {
    let mock = MockClickHouse::new();
    let executor = executor(&mock, 2);

    executor.execute("SELECT 'a'").await.unwrap();
    executor.execute("SELECT 'b'").await.unwrap();
    // Refresh 'a' so 'b' becomes the eviction candidate
    executor.execute("SELECT 'a'").await.unwrap();
    executor.execute("SELECT 'c'").await.unwrap();

    assert_eq!(executor.cache().len(), 2);
    assert!(executor.cache().contains("SELECT 'a'"));
    assert!(!executor.cache().contains("SELECT 'b'"));

    executor.execute("SELECT 'b'").await.unwrap();
    assert_eq!(mock.executions("SELECT 'a'"), 1);
    assert_eq!(mock.executions("SELECT 'b'"), 2);
    assert!(executor.cache_stats().evictions >= 1);
}

#[tokio::test]
async fn test_cache_never_exceeds_capacity() {
    let mock = MockClickHouse::new();
    let executor = executor(&mock, 128);

    for i in 0..300 {
        executor.execute(&format!("SELECT {i}")).await.unwrap();
    }

    assert_eq!(executor.cache().len(), 128);
    assert_eq!(executor.cache().capacity(), 128);
}

// ============================================================================
// Connection failures
// ============================================================================

#[tokio::test]
async fn test_connection_errors_are_not_cached() {
    let mock = MockClickHouse::with_people();
    let executor = executor(&mock, 128);

    mock.set_fail_connect(true);
    let err = executor.execute("SELECT * FROM db.t").await.unwrap_err();
    assert!(err.to_string().contains("server unavailable"));
    assert!(!executor.cache().contains("SELECT * FROM db.t"));

    mock.set_fail_connect(false);
    let result = executor.execute("SELECT * FROM db.t").await.unwrap();
    assert!(result.is_table());
    assert_eq!(mock.connects(), 2);
    assert_eq!(mock.executions("SELECT * FROM db.t"), 1);
}

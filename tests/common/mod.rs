//! In-memory stand-in for a ClickHouse server.
//!
//! Understands just enough SQL for the tests: `EXISTS <entity>`,
//! `SELECT * FROM <entity>` for registered tables, rejection of writes
//! under `readonly=1`, and access errors for denied entities. Canned answers
//! win over all of that. Anything else echoes the query text back as a
//! one-cell table. Every statement must arrive wrapped in the traceability comments.

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_clickhouse::execution::{QUERY_FOOTER, QUERY_HEADER};
use mcp_clickhouse::{
    Cell, Column, Connection, ConnectionError, ConnectionProvider, ExecutionError,
    ExecutionResult, QuerySettings, Table,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MOCK_ADDRESS: &str = "mock:8123";

#[derive(Default)]
struct MockState {
    tables: Mutex<HashMap<String, Table>>,
    executions: Mutex<HashMap<String, usize>>,
    raw_sql: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Mutex<Duration>,
    started: Mutex<HashSet<String>>,
    denied: Mutex<HashSet<String>>,
    answers: Mutex<HashMap<String, Table>>,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MockClickHouse {
    state: Arc<MockState>,
}

impl MockClickHouse {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.register(
            "system.tables",
            Table::new(vec![Column::new("name", "String")], vec![]),
        );
        mock.register(
            "system.databases",
            Table::new(vec![Column::new("name", "String")], vec![]),
        );
        mock
    }

    /// Mock with the `db.t` table used across the suite.
    pub fn with_people() -> Self {
        let mock = Self::new();
        mock.register("db.t", people_table());
        mock
    }

    pub fn provider(&self) -> Arc<dyn ConnectionProvider> {
        Arc::new(self.clone())
    }

    pub fn register(&self, entity: &str, table: Table) {
        self.state.tables.lock().insert(entity.to_string(), table);
    }

    /// Every execution of `query` takes `delay`.
    pub fn set_delay(&self, query: &str, delay: Duration) {
        self.state.delays.lock().insert(query.to_string(), delay);
    }

    pub fn set_default_delay(&self, delay: Duration) {
        *self.state.default_delay.lock() = delay;
    }

    /// Any query naming `entity` fails with ACCESS_DENIED.
    pub fn deny(&self, entity: &str) {
        self.state.denied.lock().insert(entity.to_string());
    }

    /// Answer exactly `query` with `table`.
    pub fn answer_with(&self, query: &str, table: Table) {
        self.state.answers.lock().insert(query.to_string(), table);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Times `query` reached the server
    pub fn executions(&self, query: &str) -> usize {
        self.state.executions.lock().get(query).copied().unwrap_or(0)
    }

    pub fn total_executions(&self) -> usize {
        self.state.executions.lock().values().sum()
    }

    /// Whether `query` ever started executing
    pub fn started(&self, query: &str) -> bool {
        self.state.started.lock().contains(query)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Unwrapped query texts in arrival order
    pub fn queries(&self) -> Vec<String> {
        self.state
            .raw_sql
            .lock()
            .iter()
            .map(|sql| unwrap_query(sql).unwrap_or(sql).to_string())
            .collect()
    }

    pub fn raw_sql(&self) -> Vec<String> {
        self.state.raw_sql.lock().clone()
    }
}

#[async_trait]
impl ConnectionProvider for MockClickHouse {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::Handshake {
                address: MOCK_ADDRESS.to_string(),
                message: "server unavailable".to_string(),
            });
        }
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl Connection for MockConnection {
    fn server_version(&self) -> &str {
        "24.8.1.1"
    }

    async fn query(&self, sql: &str, settings: &QuerySettings) -> ExecutionResult<Table> {
        self.state.raw_sql.lock().push(sql.to_string());
        let Some(query) = unwrap_query(sql) else {
            return Err(server_error(62, "Syntax error: statement missing wrapper"));
        };
        let query = query.to_string();

        *self.state.executions.lock().entry(query.clone()).or_insert(0) += 1;
        self.state.started.lock().insert(query.clone());

        let delay = self
            .state
            .delays
            .lock()
            .get(&query)
            .copied()
            .unwrap_or(*self.state.default_delay.lock());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.answer(&query, settings)
    }
}

impl MockConnection {
    fn answer(&self, query: &str, settings: &QuerySettings) -> ExecutionResult<Table> {
        let trimmed = query.trim();
        let upper = trimmed.to_ascii_uppercase();

        if let Some(table) = self.state.answers.lock().get(trimmed) {
            return Ok(table.clone());
        }

        if let Some(entity) = self
            .state
            .denied
            .lock()
            .iter()
            .find(|entity| trimmed.contains(entity.as_str()))
        {
            return Err(server_error(
                497,
                &format!(
                    "Code: 497. DB::Exception: default: Not enough privileges to access {entity}. (ACCESS_DENIED)"
                ),
            ));
        }

        if settings.readonly
            && ["INSERT", "CREATE", "DROP", "ALTER", "TRUNCATE", "RENAME"]
                .iter()
                .any(|kw| upper.starts_with(kw))
        {
            return Err(server_error(
                164,
                "Code: 164. DB::Exception: Cannot execute query in readonly mode. (READONLY)",
            ));
        }

        if let Some(entity) = trimmed.strip_prefix("EXISTS ") {
            let found = self.state.tables.lock().contains_key(entity.trim());
            return Ok(Table::new(
                vec![Column::new("result", "UInt8")],
                vec![vec![Cell::UInt(u64::from(found))]],
            ));
        }

        if let Some(entity) = trimmed.strip_prefix("SELECT * FROM ") {
            let entity = entity.trim();
            return match self.state.tables.lock().get(entity) {
                Some(table) => Ok(table.clone()),
                None => Err(server_error(
                    60,
                    &format!(
                        "Code: 60. DB::Exception: Unknown table expression identifier '{entity}'. (UNKNOWN_TABLE)"
                    ),
                )),
            };
        }

        Ok(Table::new(
            vec![Column::new("query", "String")],
            vec![vec![Cell::from(trimmed)]],
        ))
    }
}

fn unwrap_query(sql: &str) -> Option<&str> {
    sql.strip_prefix(QUERY_HEADER)?
        .strip_prefix('\n')?
        .strip_suffix('\n')?
        .strip_suffix(QUERY_FOOTER)?
        .strip_suffix('\n')
}

fn server_error(code: u32, message: &str) -> ExecutionError {
    ExecutionError::Server {
        status: 500,
        code: Some(code),
        message: message.to_string(),
    }
}

pub fn people_table() -> Table {
    Table::new(
        vec![Column::new("id", "UInt32"), Column::new("name", "String")],
        vec![
            vec![Cell::UInt(1), Cell::from("Alice")],
            vec![Cell::UInt(2), Cell::from("Bob")],
        ],
    )
}

//! Query Result Types
//!
//! The value-level outcome of running a query. A caller always gets a
//! [`QueryResult`] back and branches on the variant: either a decoded table,
//! or a [`QueryFailure`] whose `Display` text is what the agent sees.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Cell
// ============================================================================

/// A single scalar (or null) cell in a result row.
///
/// ClickHouse composite values (arrays, maps, tuples) are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl Cell {
    /// Check if this cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Check if this cell holds a number
    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Int(_) | Cell::UInt(_) | Cell::Float(_))
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Cell::UInt(v) => Some(*v),
            Cell::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the cell as a flag.
    ///
    /// ClickHouse reports booleans from `EXISTS` and friends as `UInt8`, so
    /// any non-zero integer is true. Strings `"1"` and `"true"` also count.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            Cell::Int(v) => Some(*v != 0),
            Cell::UInt(v) => Some(*v != 0),
            Cell::String(s) => match s.as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::UInt(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::String(s) => f.write_str(s),
            Cell::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::String(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::String(s)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<u64> for Cell {
    fn from(v: u64) -> Self {
        Cell::UInt(v)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

// ============================================================================
// Table
// ============================================================================

/// A named, typed result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// ClickHouse type name as reported by the server (e.g. `Nullable(String)`)
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Tabular query result: ordered columns and rows in server order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    /// A table with no columns and no rows (e.g. the body of a `SET`).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of the column with the given name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// First cell of the first row, if any
    pub fn first_cell(&self) -> Option<&Cell> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Get a cell by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

// ============================================================================
// QueryResult
// ============================================================================

/// Why a query produced no table.
///
/// The `Display` strings are the exact caller-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryFailure {
    /// The server rejected or failed the query
    #[error("error running query: {0}")]
    Execution(String),

    /// The deadline elapsed before a result arrived. Whole-second deadlines
    /// print as integers, others keep their fraction.
    #[error("Queries taking longer than {} seconds are currently not supported.", .0.as_secs_f64())]
    Timeout(Duration),

    /// The runner's wait queue is full
    #[error("Query runner saturated: {queued} queries already waiting, try again later.")]
    Saturated { queued: usize },

    /// The runner has been shut down
    #[error("Query runner is shut down.")]
    ShutDown,
}

/// Outcome of a query: a table or a failure.
///
/// Tables are shared behind an `Arc` so cache hits never copy rows.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Table(Arc<Table>),
    Failed(QueryFailure),
}

impl QueryResult {
    pub fn table(table: Table) -> Self {
        QueryResult::Table(Arc::new(table))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, QueryResult::Table(_))
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            QueryResult::Table(t) => Some(t),
            QueryResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&QueryFailure> {
        match self {
            QueryResult::Table(_) => None,
            QueryResult::Failed(f) => Some(f),
        }
    }

    /// Caller-facing text: markdown for tables, the failure message otherwise.
    pub fn to_display_text(&self) -> String {
        match self {
            QueryResult::Table(t) => t.to_markdown(),
            QueryResult::Failed(f) => f.to_string(),
        }
    }
}

impl From<Table> for QueryResult {
    fn from(table: Table) -> Self {
        QueryResult::table(table)
    }
}

impl From<QueryFailure> for QueryResult {
    fn from(failure: QueryFailure) -> Self {
        QueryResult::Failed(failure)
    }
}

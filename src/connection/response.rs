//! JSONCompact response decoding.
//!
//! ```json
//! {"meta":[{"name":"id","type":"UInt32"}],"data":[[1],[2]],"rows":2}
//! ```
//!
//! 64-bit integers arrive quoted by default
//! (`output_format_json_quote_64bit_integers`), so quoted values in integer
//! columns are parsed back into numbers.

use serde::Deserialize;
use serde_json::Value as Json;

use crate::execution::{ExecutionError, ExecutionResult};
use crate::result::{Cell, Column, Table};

#[derive(Deserialize)]
struct CompactBody {
    meta: Vec<Column>,
    #[serde(default)]
    data: Vec<Vec<Json>>,
}

/// Decode a `JSONCompact` body. An empty body decodes to an empty table.
pub fn decode_json_compact(body: &str) -> ExecutionResult<Table> {
    if body.trim().is_empty() {
        return Ok(Table::empty());
    }
    let parsed: CompactBody =
        serde_json::from_str(body).map_err(|e| ExecutionError::Decode(e.to_string()))?;

    let width = parsed.meta.len();
    let mut rows = Vec::with_capacity(parsed.data.len());
    for (i, raw) in parsed.data.into_iter().enumerate() {
        if raw.len() != width {
            return Err(ExecutionError::Decode(format!(
                "row {i} has {} values, expected {width}",
                raw.len()
            )));
        }
        let row = raw
            .into_iter()
            .zip(&parsed.meta)
            .map(|(value, column)| to_cell(value, &column.type_name))
            .collect();
        rows.push(row);
    }
    Ok(Table::new(parsed.meta, rows))
}

// Strip wrappers that do not change the JSON representation.
fn base_type(type_name: &str) -> &str {
    let mut t = type_name.trim();
    loop {
        let inner = ["Nullable(", "LowCardinality(", "SimpleAggregateFunction("]
            .iter()
            .find_map(|w| t.strip_prefix(w).and_then(|rest| rest.strip_suffix(')')));
        match inner {
            Some(rest) => t = rest.trim(),
            None => return t,
        }
    }
}

fn to_cell(value: Json, type_name: &str) -> Cell {
    match value {
        Json::Null => Cell::Null,
        Json::Bool(b) => Cell::Bool(b),
        Json::Number(n) => {
            if let Some(v) = n.as_u64() {
                if base_type(type_name).starts_with("UInt") {
                    Cell::UInt(v)
                } else {
                    i64::try_from(v).map_or(Cell::UInt(v), Cell::Int)
                }
            } else if let Some(v) = n.as_i64() {
                Cell::Int(v)
            } else {
                n.as_f64().map_or(Cell::Null, Cell::Float)
            }
        }
        Json::String(s) => {
            let base = base_type(type_name);
            if base.starts_with("UInt") {
                s.parse::<u64>().map_or(Cell::String(s), Cell::UInt)
            } else if base.starts_with("Int") {
                s.parse::<i64>().map_or(Cell::String(s), Cell::Int)
            } else {
                Cell::String(s)
            }
        }
        other => Cell::Json(other),
    }
}

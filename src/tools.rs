//! Metadata Tools
//!
//! The operations offered to the agent. Metadata listings prefer the curated
//! `assistant.*` tables and fall back to ClickHouse's `system.*` tables when
//! the curated ones are absent. Ad-hoc SQL goes through the bounded runner so
//! it is subject to the query deadline; the metadata templates are run
//! directly on the memoized executor.

use serde::Deserialize;
use serde_json::{json, Value as Json};
use tracing::info;

use crate::connection::ConnectionError;
use crate::result::QueryResult;
use crate::service::QueryService;

const ASSISTANT_DATABASES: &str = "assistant.databases";
const ASSISTANT_TABLES: &str = "assistant.tables";
const ASSISTANT_COLUMNS: &str = "assistant.columns";
const ASSISTANT_TABLE_RELATIONS: &str = "assistant.table_relations";

/// Tool invocation errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Quote a value as a ClickHouse string literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Comma-separated quoted literals for an `IN (...)` clause.
pub fn format_list_for_sql<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| quote_literal(v.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Tool catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    ListDatabases,
    ListDatabaseTables,
    ListTableColumns,
    GetTableRelationships,
    RunSelectQuery,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::ListDatabases,
        Tool::ListDatabaseTables,
        Tool::ListTableColumns,
        Tool::GetTableRelationships,
        Tool::RunSelectQuery,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::ListDatabases => "list_databases",
            Tool::ListDatabaseTables => "list_database_tables",
            Tool::ListTableColumns => "list_table_columns",
            Tool::GetTableRelationships => "get_table_relationships",
            Tool::RunSelectQuery => "run_select_query",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::ListDatabases => "List all databases in the ClickHouse server.",
            Tool::ListDatabaseTables => {
                "List tables in specified database(s). (supports multiple databases)"
            }
            Tool::ListTableColumns => {
                "List all columns in specified tables. (supports multiple tables)"
            }
            Tool::GetTableRelationships => {
                "Displays the relationship structure for the specified table, including \
                 foreign keys, dependencies, and relationships with other tables in the data \
                 schema. Allows quick visualization of the data model for optimal query \
                 construction."
            }
            Tool::RunSelectQuery => "Run a SELECT query asynchronously with a timeout.",
        }
    }

    /// JSON schema of the tool's arguments
    pub fn input_schema(self) -> Json {
        match self {
            Tool::ListDatabases => json!({"type": "object", "properties": {}}),
            Tool::ListDatabaseTables => json!({
                "type": "object",
                "properties": {
                    "databases": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The list of database names."
                    }
                },
                "required": ["databases"]
            }),
            Tool::ListTableColumns => json!({
                "type": "object",
                "properties": {
                    "table_names_with_schema": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Tables as database.table."
                    }
                },
                "required": ["table_names_with_schema"]
            }),
            Tool::GetTableRelationships => json!({
                "type": "object",
                "properties": {
                    "table_name_with_schema": {
                        "type": "string",
                        "description": "Table as database.table."
                    }
                },
                "required": ["table_name_with_schema"]
            }),
            Tool::RunSelectQuery => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The SQL query to execute."}
                },
                "required": ["query"]
            }),
        }
    }
}

/// A parsed tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListDatabases,
    ListDatabaseTables { databases: Vec<String> },
    ListTableColumns { table_names_with_schema: Vec<String> },
    GetTableRelationships { table_name_with_schema: String },
    RunSelectQuery { query: String },
}

#[derive(Deserialize)]
struct DatabasesArgs {
    databases: Vec<String>,
}

#[derive(Deserialize)]
struct TablesArgs {
    table_names_with_schema: Vec<String>,
}

#[derive(Deserialize)]
struct TableArgs {
    table_name_with_schema: String,
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

impl ToolCall {
    /// Parse a tool name and its JSON arguments.
    pub fn parse(name: &str, arguments: &Json) -> Result<ToolCall, ToolError> {
        let tool = Tool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = if arguments.is_null() {
            json!({})
        } else {
            arguments.clone()
        };
        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool: tool.name(),
            message: e.to_string(),
        };
        let non_empty = |values: Vec<String>| {
            if values.is_empty() {
                Err(ToolError::InvalidArguments {
                    tool: tool.name(),
                    message: "at least one name is required".to_string(),
                })
            } else {
                Ok(values)
            }
        };

        Ok(match tool {
            Tool::ListDatabases => ToolCall::ListDatabases,
            Tool::ListDatabaseTables => {
                let a: DatabasesArgs = serde_json::from_value(args).map_err(invalid)?;
                ToolCall::ListDatabaseTables {
                    databases: non_empty(a.databases)?,
                }
            }
            Tool::ListTableColumns => {
                let a: TablesArgs = serde_json::from_value(args).map_err(invalid)?;
                ToolCall::ListTableColumns {
                    table_names_with_schema: non_empty(a.table_names_with_schema)?,
                }
            }
            Tool::GetTableRelationships => {
                let a: TableArgs = serde_json::from_value(args).map_err(invalid)?;
                ToolCall::GetTableRelationships {
                    table_name_with_schema: a.table_name_with_schema,
                }
            }
            Tool::RunSelectQuery => {
                let a: QueryArgs = serde_json::from_value(args).map_err(invalid)?;
                ToolCall::RunSelectQuery { query: a.query }
            }
        })
    }

    pub fn tool(&self) -> Tool {
        match self {
            ToolCall::ListDatabases => Tool::ListDatabases,
            ToolCall::ListDatabaseTables { .. } => Tool::ListDatabaseTables,
            ToolCall::ListTableColumns { .. } => Tool::ListTableColumns,
            ToolCall::GetTableRelationships { .. } => Tool::GetTableRelationships,
            ToolCall::RunSelectQuery { .. } => Tool::RunSelectQuery,
        }
    }
}

/// Text handed back to the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl From<QueryResult> for ToolOutput {
    fn from(result: QueryResult) -> Self {
        ToolOutput {
            is_error: !result.is_table(),
            text: result.to_display_text(),
        }
    }
}

/// Dispatch a parsed call.
pub async fn call_tool(service: &QueryService, call: ToolCall) -> Result<ToolOutput, ToolError> {
    let result = match call {
        ToolCall::ListDatabases => list_databases(service).await?,
        ToolCall::ListDatabaseTables { databases } => {
            list_database_tables(service, &databases).await?
        }
        ToolCall::ListTableColumns {
            table_names_with_schema,
        } => list_table_columns(service, &table_names_with_schema).await?,
        ToolCall::GetTableRelationships {
            table_name_with_schema,
        } => get_table_relationships(service, &table_name_with_schema).await?,
        ToolCall::RunSelectQuery { query } => run_select_query(service, &query).await?,
    };
    Ok(result.into())
}

// ============================================================================
// Tools
// ============================================================================

pub async fn list_databases(service: &QueryService) -> Result<QueryResult, ConnectionError> {
    info!("Called tool: list_databases");
    let sql = if service.exists(ASSISTANT_DATABASES).await {
        "SELECT database_name, database_description FROM assistant.databases"
    } else {
        "SELECT name AS database_name, comment AS database_description FROM system.databases"
    };
    service.execute(sql).await
}

pub async fn list_database_tables(
    service: &QueryService,
    databases: &[String],
) -> Result<QueryResult, ConnectionError> {
    info!(?databases, "Called tool: list_database_tables");
    let list = format_list_for_sql(databases);
    let sql = if service.exists(ASSISTANT_TABLES).await {
        format!(
            "SELECT table_name, table_description, table_sorting_key \
             FROM assistant.tables WHERE database_name IN ({list})"
        )
    } else {
        format!(
            "SELECT database || '.' || name AS table_name, comment AS table_description, \
             sorting_key AS table_sorting_key FROM system.tables WHERE database IN ({list})"
        )
    };
    service.execute(&sql).await
}

pub async fn list_table_columns(
    service: &QueryService,
    table_names_with_schema: &[String],
) -> Result<QueryResult, ConnectionError> {
    info!(?table_names_with_schema, "Called tool: list_table_columns");
    let list = format_list_for_sql(table_names_with_schema);
    let sql = if service.exists(ASSISTANT_COLUMNS).await {
        format!(
            "SELECT column_name, column_type, column_description \
             FROM assistant.columns WHERE table_name IN ({list})"
        )
    } else {
        format!(
            "SELECT name AS column_name, type AS column_type, comment AS column_description \
             FROM system.columns WHERE database || '.' || table IN ({list})"
        )
    };
    service.execute(&sql).await
}

pub async fn get_table_relationships(
    service: &QueryService,
    table_name_with_schema: &str,
) -> Result<QueryResult, ConnectionError> {
    info!(table_name_with_schema, "Called tool: get_table_relationships");
    let sql = if service.exists(ASSISTANT_TABLE_RELATIONS).await {
        format!(
            "SELECT foreign_column_name, related_table_name, join_column_name, relationship \
             FROM assistant.table_relations WHERE table_name = {}",
            quote_literal(table_name_with_schema)
        )
    } else {
        "SELECT '' AS foreign_column_name, '' AS related_table_name, \
         '' AS join_column_name, '' AS relationship"
            .to_string()
    };
    service.execute(&sql).await
}

pub async fn run_select_query(
    service: &QueryService,
    query: &str,
) -> Result<QueryResult, ConnectionError> {
    info!(query, "Executing SELECT query");
    service.run(query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("default"), "'default'");
        assert_eq!(quote_literal("o'brien"), r"'o\'brien'");
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_format_list_for_sql() {
        assert_eq!(
            format_list_for_sql(&["default", "system"]),
            "'default', 'system'"
        );
        assert_eq!(format_list_for_sql::<&str>(&[]), "");
    }

    #[test]
    fn test_tool_names_roundtrip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
            assert_eq!(tool.input_schema()["type"], "object");
        }
        assert_eq!(Tool::from_name("drop_everything"), None);
    }

    #[test]
    fn test_parse_tool_calls() {
        assert_eq!(
            ToolCall::parse("list_databases", &Json::Null).unwrap(),
            ToolCall::ListDatabases
        );
        assert_eq!(
            ToolCall::parse("list_database_tables", &json!({"databases": ["db"]})).unwrap(),
            ToolCall::ListDatabaseTables {
                databases: vec!["db".to_string()]
            }
        );
        assert_eq!(
            ToolCall::parse("run_select_query", &json!({"query": "SELECT 1"}))
                .unwrap()
                .tool(),
            Tool::RunSelectQuery
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(matches!(
            ToolCall::parse("nope", &json!({})),
            Err(ToolError::UnknownTool(_))
        ));
        assert!(matches!(
            ToolCall::parse("run_select_query", &json!({"sql": "SELECT 1"})),
            Err(ToolError::InvalidArguments {
                tool: "run_select_query",
                ..
            })
        ));
        assert!(matches!(
            ToolCall::parse("list_table_columns", &json!({"table_names_with_schema": []})),
            Err(ToolError::InvalidArguments { .. })
        ));
    }
}

//! Schema Prober
//!
//! Answers "does this table/database exist?" with `EXISTS <name>` sent
//! through the memoized executor.
//!
//! The name is interpolated as-is. Only pass identifiers built by this
//! crate, never raw user input.

use std::sync::Arc;
use tracing::warn;

use super::executor::MemoizedExecutor;
use crate::connection::ConnectionError;
use crate::result::{QueryFailure, QueryResult};

/// Why a probe could not give a definite answer
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("existence probe failed: {0}")]
    Execution(QueryFailure),

    #[error("existence probe returned no flag for '{entity}'")]
    Malformed { entity: String },
}

#[derive(Clone)]
pub struct SchemaProber {
    executor: Arc<MemoizedExecutor>,
}

impl SchemaProber {
    pub fn new(executor: Arc<MemoizedExecutor>) -> Self {
        Self { executor }
    }

    /// Existence probe that reports why it failed.
    pub async fn probe(&self, entity: &str) -> Result<bool, ProbeError> {
        let query = format!("EXISTS {entity}");
        match self.executor.execute(&query).await? {
            QueryResult::Table(table) => table
                .first_cell()
                .and_then(|cell| cell.as_flag())
                .ok_or_else(|| ProbeError::Malformed {
                    entity: entity.to_string(),
                }),
            QueryResult::Failed(failure) => Err(ProbeError::Execution(failure)),
        }
    }

    /// Existence probe; any failure counts as "does not exist".
    ///
    /// A permission error or an unreachable server therefore looks the same
    /// as a missing table. Use [`probe`](Self::probe) to tell them apart.
    pub async fn exists(&self, entity: &str) -> bool {
        match self.probe(entity).await {
            Ok(found) => found,
            Err(e) => {
                warn!(entity, error = %e, "existence probe failed, treating as absent");
                false
            }
        }
    }
}

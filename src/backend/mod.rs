//! Remote row-store access.
//!
//! The hosted backend exposes one REST resource per table. Everything above
//! this module talks to it through [`TableBackend`], so contexts can run
//! against the real service or an in-memory table in tests.

#[cfg(test)]
pub mod memory;
pub mod rest;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use rest::RestClient;

/// Row identifier. Tables use either integer or text primary keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Placeholder for records that have not been assigned an id yet.
    pub fn unset() -> Self {
        RecordId::Text(String::new())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, RecordId::Text(s) if s.is_empty())
    }

    /// Parse user input: all-digit strings become integer ids.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.parse::<i64>() {
            Ok(n) => RecordId::Int(n),
            Err(_) => RecordId::Text(input.to_string()),
        }
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// Select parameters: projected columns, equality filters and ordering.
#[derive(Debug, Clone)]
pub struct Query {
    pub columns: String,
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, bool)>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }
}

/// Render a filter value the way the REST filter syntax expects it.
pub fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected request ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected backend payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend returned no row for {0}")]
    EmptyResponse(String),
}

impl BackendError {
    /// Foreign-key violation (Postgres SQLSTATE 23503).
    pub fn is_reference_violation(&self) -> bool {
        matches!(self, BackendError::Api { code: Some(code), .. } if code == "23503")
    }

    /// Unique-key violation (Postgres SQLSTATE 23505).
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, BackendError::Api { code: Some(code), .. } if code == "23505")
    }
}

/// Table-scoped CRUD surface of the hosted row store.
///
/// Mutations return the affected rows as the server stored them.
#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, BackendError>;

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), BackendError>;

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, BackendError>;
}

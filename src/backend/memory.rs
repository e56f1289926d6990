//! In-memory table store used by the context tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{filter_literal, BackendError, Query, RecordId, TableBackend};

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<String>>,
    /// op name -> optional SQLSTATE to fail the next call of that op with
    failures: Mutex<HashMap<String, Option<String>>>,
    empty_inserts: Mutex<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        }
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `op` ("select", "insert", ...) fail.
    pub fn fail_next(&self, op: &str, code: Option<&str>) {
        self.failures
            .lock()
            .unwrap()
            .insert(op.to_string(), code.map(str::to_string));
    }

    pub fn return_empty_inserts(&self) {
        *self.empty_inserts.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(op))
            .count()
    }

    fn record(&self, op: &str, table: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(format!("{} {}", op, table));
        match self.failures.lock().unwrap().remove(op) {
            Some(code) => Err(BackendError::Api {
                status: 409,
                code,
                message: format!("injected {} failure", op),
            }),
            None => Ok(()),
        }
    }
}

fn row_id(row: &Value) -> Option<RecordId> {
    row.get("id")
        .and_then(|v| serde_json::from_value::<RecordId>(v.clone()).ok())
}

fn matches_filters(row: &Value, filters: &[(String, Value)]) -> bool {
    filters.iter().all(|(column, value)| {
        row.get(column)
            .map(|v| filter_literal(v) == filter_literal(value))
            .unwrap_or(false)
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => filter_literal(x).cmp(&filter_literal(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.record("select", table)?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|r| matches_filters(r, &query.filters))
            .collect();
        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, BackendError> {
        self.record("insert", table)?;
        let mut row = match row {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };
        let needs_id = row.get("id").map(|v| v.is_null()).unwrap_or(true);
        if needs_id {
            let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
            row["id"] = Value::from(id);
        }
        if row.get("created_at").is_none() {
            row["created_at"] = Value::from("2026-01-01T00:00:00Z");
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());

        if *self.empty_inserts.lock().unwrap() {
            return Ok(Vec::new());
        }
        Ok(vec![row])
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.record("update", table)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if row_id(row).as_ref() == Some(id) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), BackendError> {
        self.record("delete", table)?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| row_id(row).as_ref() != Some(id));
        }
        Ok(())
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, BackendError> {
        self.record("upsert", table)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let key = row.get(on_conflict).cloned();
        if let Some(existing) = rows
            .iter_mut()
            .find(|r| key.is_some() && r.get(on_conflict) == key.as_ref())
        {
            merge(existing, &row);
            return Ok(vec![existing.clone()]);
        }
        rows.push(row.clone());
        Ok(vec![row])
    }
}

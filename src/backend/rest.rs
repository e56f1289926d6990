use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{filter_literal, BackendError, Query, RecordId, TableBackend};

/// Error body returned by the REST gateway.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key,
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("BACKEND_URL").context("BACKEND_URL required")?;
        let api_key = dotenv::var("BACKEND_ANON_KEY").ok().filter(|k| !k.is_empty());
        Self::new(&base_url, api_key)
    }

    /// Resolve the table endpoint from the base URL.
    fn endpoint(&self, table: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/rest/v1") {
            format!("{}/{}", base, table)
        } else {
            format!("{}/rest/v1/{}", base, table)
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    async fn rows(resp: Response) -> Result<Vec<Value>, BackendError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
            let (code, message) = match body {
                Some(b) => {
                    let mut message = b.message.unwrap_or_else(|| text.clone());
                    if let Some(details) = b.details.filter(|d| !d.is_empty()) {
                        message = format!("{} ({})", message, details);
                    }
                    (b.code, message)
                }
                None => (None, text),
            };
            return Err(BackendError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            row @ Value::Object(_) => Ok(vec![row]),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl TableBackend for RestClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut params = vec![("select".to_string(), query.columns.clone())];
        for (column, value) in &query.filters {
            params.push((column.clone(), format!("eq.{}", filter_literal(value))));
        }
        if let Some((column, ascending)) = &query.order {
            let dir = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, dir)));
        }

        debug!(table, filters = query.filters.len(), "select");
        let req = self.client.get(self.endpoint(table)).query(&params);
        let resp = self.authorize(req).send().await?;
        Self::rows(resp).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, BackendError> {
        debug!(table, "insert");
        let req = self
            .client
            .post(self.endpoint(table))
            .header("Prefer", "return=representation")
            .json(&row);
        let resp = self.authorize(req).send().await?;
        Self::rows(resp).await
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        debug!(table, %id, "update");
        let req = self
            .client
            .patch(self.endpoint(table))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch);
        let resp = self.authorize(req).send().await?;
        Self::rows(resp).await
    }

    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), BackendError> {
        debug!(table, %id, "delete");
        let req = self
            .client
            .delete(self.endpoint(table))
            .query(&[("id", format!("eq.{}", id))]);
        let resp = self.authorize(req).send().await?;
        Self::rows(resp).await.map(|_| ())
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, BackendError> {
        debug!(table, on_conflict, "upsert");
        let req = self
            .client
            .post(self.endpoint(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row);
        let resp = self.authorize(req).send().await?;
        Self::rows(resp).await
    }
}

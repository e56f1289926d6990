use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::{QuotationDraft, QuoteError};
use crate::backend::{BackendError, Query, RecordId, TableBackend};
use crate::records::nullable;
use crate::session::Session;
use crate::settings::TaxRates;

const TABLE: &str = "saved_records";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecord {
    pub id: RecordId,
    #[serde(default, deserialize_with = "nullable")]
    pub quote_number: String,
    #[serde(default, deserialize_with = "nullable")]
    pub document_type: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub created_by: Option<RecordId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub grand_total: Option<f64>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing)]
    pub app_users: Option<Creator>,
}

impl SavedRecord {
    pub fn created_by_name(&self) -> &str {
        self.app_users
            .as_ref()
            .and_then(|u| u.full_name.as_deref())
            .unwrap_or("-")
    }

    /// `dd Mon yyyy` from the stored timestamp, or the raw text if unparseable.
    pub fn created_on(&self) -> String {
        let Some(raw) = self.created_at.as_deref() else {
            return "-".to_string();
        };
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.format("%d %b %Y").to_string())
            .unwrap_or_else(|_| raw.to_string())
    }

    /// Reopen the stored document as an editable draft.
    pub fn to_draft(&self) -> Result<QuotationDraft, QuoteError> {
        let payload = self.payload.clone().ok_or(QuoteError::MissingPayload)?;
        serde_json::from_value(payload)
            .map_err(|e| QuoteError::Remote(BackendError::Decode(e)))
    }

    fn matches(&self, needle: &str) -> bool {
        [
            Some(self.quote_number.as_str()),
            self.client_name.as_deref(),
            Some(self.document_type.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Mirror of the `saved_records` table, newest first.
pub struct SavedRecords {
    backend: Arc<dyn TableBackend>,
    records: RwLock<Vec<SavedRecord>>,
    loading: AtomicBool,
}

impl SavedRecords {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self {
            backend,
            records: RwLock::new(Vec::new()),
            loading: AtomicBool::new(true),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn items(&self) -> Vec<SavedRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &RecordId) -> Option<SavedRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    /// On failure the previous list is kept and the error returned.
    pub async fn fetch(&self) -> Result<usize, QuoteError> {
        self.loading.store(true, Ordering::SeqCst);
        let query = Query::new()
            .columns("*, app_users(full_name)")
            .order("created_at", false);
        let result = self.backend.select(TABLE, &query).await;
        self.loading.store(false, Ordering::SeqCst);

        let rows = result.map_err(|e| {
            error!("Failed to load saved records: {}", e);
            QuoteError::Remote(e)
        })?;
        let records: Vec<SavedRecord> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("Skipping undecodable saved record: {}", e);
                    None
                }
            })
            .collect();
        let count = records.len();
        *self.records.write().await = records;
        info!(count, "saved records loaded");
        Ok(count)
    }

    /// Case-insensitive substring match; an empty term returns everything.
    pub async fn search(&self, term: &str) -> Vec<SavedRecord> {
        let needle = term.trim().to_lowercase();
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.matches(&needle))
            .cloned()
            .collect()
    }

    pub async fn save(
        &self,
        draft: &QuotationDraft,
        session: &Session,
        rates: TaxRates,
    ) -> Result<SavedRecord, QuoteError> {
        if draft.items.is_empty() {
            return Err(QuoteError::EmptyDraft);
        }
        let client_name = Some(draft.bill_to.name.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let row = json!({
            "quote_number": draft.doc_id,
            "document_type": draft.doc_type.label(),
            "client_name": client_name,
            "created_by": session.id,
            "grand_total": draft.totals(rates).grand_total,
            "payload": serde_json::to_value(draft).map_err(BackendError::from)?,
        });

        let inserted = self.backend.insert(TABLE, row).await?;
        let row = inserted
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::EmptyResponse(TABLE.to_string()))?;
        let mut record: SavedRecord = serde_json::from_value(row).map_err(BackendError::from)?;
        record.app_users = Some(Creator {
            full_name: Some(session.full_name.clone()),
        });

        self.records.write().await.insert(0, record.clone());
        info!(quote_number = %record.quote_number, user = %session.username, "record saved");
        Ok(record)
    }

    /// Delete remotely, then refetch the list.
    pub async fn delete(&self, id: &RecordId) -> Result<(), QuoteError> {
        if let Err(e) = self.backend.delete(TABLE, id).await {
            error!(%id, "Failed to delete record: {}", e);
            return Err(e.into());
        }
        info!(%id, "record deleted");
        self.fetch().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::docid::{DocIdGenerator, DocType};
    use crate::session::Role;

    const RATES: TaxRates = TaxRates { cgst: 9.0, sgst: 9.0 };

    fn rows() -> Vec<serde_json::Value> {
        vec![
            json!({
                "id": 1, "quote_number": "EESIPL/2026/01/QN/101", "document_type": "Quotation",
                "client_name": "Client 1 Name", "created_at": "2026-01-05T10:00:00Z",
                "app_users": { "full_name": "Asha Rao" }
            }),
            json!({
                "id": 2, "quote_number": "EESIPL/2026/02/TI/007", "document_type": "Tax Invoice",
                "client_name": null, "created_at": "2026-02-14T10:00:00Z"
            }),
        ]
    }

    fn session() -> Session {
        Session {
            id: RecordId::Int(5),
            username: "asha".into(),
            full_name: "Asha Rao".into(),
            role: Role::Standard,
        }
    }

    #[tokio::test]
    async fn test_fetch_newest_first() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let saved = SavedRecords::new(backend);
        assert!(saved.is_loading());
        assert_eq!(saved.fetch().await.unwrap(), 2);
        assert!(!saved.is_loading());

        let items = saved.items().await;
        assert_eq!(items[0].id, RecordId::Int(2));
        assert_eq!(items[1].created_by_name(), "Asha Rao");
        assert_eq!(items[0].created_by_name(), "-");
        assert_eq!(items[1].created_on(), "05 Jan 2026");
    }

    #[tokio::test]
    async fn test_fetch_tolerates_null_and_malformed_rows() {
        let mut stored = rows();
        stored.push(json!({
            "id": 3, "quote_number": null, "document_type": null,
            "client_name": "Walk-in", "created_at": "2026-03-01T10:00:00Z"
        }));
        stored.push(json!({ "id": { "bad": true }, "quote_number": "EESIPL/2026/03/QN/001" }));
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, stored));
        let saved = SavedRecords::new(backend);

        assert_eq!(saved.fetch().await.unwrap(), 3);
        let walk_in = saved.get(&RecordId::Int(3)).await.unwrap();
        assert_eq!(walk_in.quote_number, "");
        assert_eq!(walk_in.document_type, "");
        assert_eq!(saved.search("walk-in").await.len(), 1);
        assert_eq!(saved.search("ti/007").await.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_list() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let saved = SavedRecords::new(backend.clone());
        saved.fetch().await.unwrap();
        backend.fail_next("select", None);
        assert!(saved.fetch().await.is_err());
        assert_eq!(saved.items().await.len(), 2);
        assert!(!saved.is_loading());
    }

    #[tokio::test]
    async fn test_search_fields() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let saved = SavedRecords::new(backend);
        saved.fetch().await.unwrap();

        assert_eq!(saved.search("").await.len(), 2);
        assert_eq!(saved.search("ti/007").await.len(), 1);
        assert_eq!(saved.search("CLIENT 1").await.len(), 1);
        assert_eq!(saved.search("tax invoice").await[0].id, RecordId::Int(2));
        assert!(saved.search("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        let saved = SavedRecords::new(backend.clone());
        let ids = DocIdGenerator::default();
        let mut draft = QuotationDraft::new(DocType::ProformaInvoice, &ids);

        assert!(matches!(
            saved.save(&draft, &session(), RATES).await,
            Err(QuoteError::EmptyDraft)
        ));
        assert_eq!(backend.call_count("insert"), 0);

        draft.bill_to.name = "Indus Towers Ltd.".into();
        draft.add_item("Load test", None, None, 1000.0, 1.0).unwrap();
        let record = saved.save(&draft, &session(), RATES).await.unwrap();

        assert_eq!(record.document_type, "Proforma Invoice");
        assert_eq!(record.grand_total, Some(1180.0));
        assert_eq!(record.created_by_name(), "Asha Rao");
        assert_eq!(saved.items().await.len(), 1);
        assert_eq!(backend.rows(TABLE)[0]["created_by"], 5);
        assert_eq!(record.to_draft().unwrap(), draft);
    }

    #[tokio::test]
    async fn test_delete_refetches() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let saved = SavedRecords::new(backend.clone());
        saved.fetch().await.unwrap();

        saved.delete(&RecordId::Int(1)).await.unwrap();
        assert_eq!(backend.call_count("select"), 2);
        assert_eq!(saved.items().await.len(), 1);

        backend.fail_next("delete", None);
        assert!(saved.delete(&RecordId::Int(2)).await.is_err());
        assert_eq!(saved.items().await.len(), 1);
    }
}

//! Key/value application settings (tax rates, bank details, payment terms).
//!
//! Unlike [`crate::sync::SyncedCollection`], a failed write is undone by
//! re-reading the whole table rather than restoring a snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::backend::{BackendError, Query, TableBackend};

const TABLE: &str = "app_settings";
const KEY_COLUMN: &str = "setting_key";

pub const TAX_CGST: &str = "tax_cgst";
pub const TAX_SGST: &str = "tax_sgst";
pub const BANK_NAME: &str = "bank_name";
pub const BANK_ACCOUNT: &str = "bank_account_number";
pub const BANK_IFSC: &str = "bank_ifsc";
pub const PAYMENT_TERMS: &str = "payment_terms";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Numeric when the text parses to a finite number, text otherwise.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() && !raw.trim().is_empty() => SettingValue::Number(n),
            _ => SettingValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            SettingValue::Text(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Number(n) => write!(f, "{}", n),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SettingRow {
    setting_key: String,
    #[serde(default)]
    setting_value: Value,
}

impl SettingRow {
    /// The stored value as text; non-string scalars are rendered first.
    fn raw_value(&self) -> String {
        match &self.setting_value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxRates {
    pub cgst: f64,
    pub sgst: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub ifsc: String,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to update setting {key}: {source}")]
pub struct SettingsError {
    pub key: String,
    #[source]
    pub source: BackendError,
}

pub fn default_settings() -> BTreeMap<String, SettingValue> {
    BTreeMap::from([
        (TAX_CGST.to_string(), SettingValue::Number(9.0)),
        (TAX_SGST.to_string(), SettingValue::Number(9.0)),
    ])
}

pub struct SettingsStore {
    backend: Arc<dyn TableBackend>,
    values: RwLock<BTreeMap<String, SettingValue>>,
    loading: AtomicBool,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self {
            backend,
            values: RwLock::new(default_settings()),
            loading: AtomicBool::new(true),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn all(&self) -> BTreeMap<String, SettingValue> {
        self.values.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.read().await.get(key).cloned()
    }

    pub async fn number(&self, key: &str) -> Option<f64> {
        self.get(key).await.and_then(|v| v.as_f64())
    }

    pub async fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .await
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
    }

    pub async fn tax_rates(&self) -> TaxRates {
        TaxRates {
            cgst: self.number(TAX_CGST).await.unwrap_or(9.0),
            sgst: self.number(TAX_SGST).await.unwrap_or(9.0),
        }
    }

    /// Present only when all three bank fields are set.
    pub async fn bank_details(&self) -> Option<BankDetails> {
        Some(BankDetails {
            bank_name: self.text(BANK_NAME).await?,
            account_number: self.text(BANK_ACCOUNT).await?,
            ifsc: self.text(BANK_IFSC).await?,
        })
    }

    pub async fn payment_terms(&self) -> Option<String> {
        self.text(PAYMENT_TERMS).await
    }

    /// Merge the table over the current values. Failures keep what we have.
    pub async fn fetch_all(&self) {
        self.loading.store(true, Ordering::SeqCst);

        match self.backend.select(TABLE, &Query::new()).await {
            Ok(rows) => {
                let mut loaded = BTreeMap::new();
                for row in rows {
                    match serde_json::from_value::<SettingRow>(row) {
                        Ok(r) => {
                            let value = SettingValue::coerce(&r.raw_value());
                            loaded.insert(r.setting_key, value);
                        }
                        Err(e) => warn!("Skipping malformed setting row: {}", e),
                    }
                }
                let count = loaded.len();
                self.values.write().await.extend(loaded);
                info!(count, "settings loaded");
            }
            Err(e) => warn!("Settings fetch failed, keeping current values: {}", e),
        }

        self.loading.store(false, Ordering::SeqCst);
    }

    pub async fn update_one(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.clone());

        let row = json!({
            "setting_key": key,
            "setting_value": value.to_string(),
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });

        match self.backend.upsert(TABLE, row, KEY_COLUMN).await {
            Ok(_) => {
                info!(key, %value, "setting updated");
                Ok(())
            }
            Err(e) => {
                error!(key, "Setting update failed, refetching: {}", e);
                self.fetch_all().await;
                Err(SettingsError {
                    key: key.to_string(),
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn rows() -> Vec<serde_json::Value> {
        vec![
            json!({ "setting_key": "tax_cgst", "setting_value": "6" }),
            json!({ "setting_key": "bank_name", "setting_value": "Canara Bank" }),
            json!({ "setting_key": "bank_account_number", "setting_value": "0412201000123" }),
            json!({ "setting_key": "bank_ifsc", "setting_value": "CNRB0000412" }),
        ]
    }

    #[test]
    fn test_coerce() {
        assert_eq!(SettingValue::coerce("9"), SettingValue::Number(9.0));
        assert_eq!(SettingValue::coerce(" 2.5 "), SettingValue::Number(2.5));
        assert_eq!(SettingValue::coerce("inf"), SettingValue::Text("inf".into()));
        assert_eq!(SettingValue::coerce(""), SettingValue::Text(String::new()));
        assert_eq!(
            SettingValue::coerce("30 days"),
            SettingValue::Text("30 days".into())
        );
        assert_eq!(SettingValue::Number(9.0).to_string(), "9");
        assert_eq!(SettingValue::Number(2.5).to_string(), "2.5");
    }

    #[tokio::test]
    async fn test_fetch_merges_over_defaults() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let settings = SettingsStore::new(backend);
        assert!(settings.is_loading());
        settings.fetch_all().await;
        assert!(!settings.is_loading());

        let rates = settings.tax_rates().await;
        assert_eq!(rates, TaxRates { cgst: 6.0, sgst: 9.0 });
        let bank = settings.bank_details().await.unwrap();
        assert_eq!(bank.ifsc, "CNRB0000412");
        assert!(settings.payment_terms().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_accepts_non_string_values() {
        let backend = Arc::new(MemoryBackend::new().with_rows(
            TABLE,
            vec![
                json!({ "setting_key": "tax_cgst", "setting_value": 12 }),
                json!({ "setting_key": "tax_sgst", "setting_value": 2.5 }),
                json!({ "setting_key": "show_bank", "setting_value": true }),
                json!({ "setting_key": "payment_terms", "setting_value": null }),
            ],
        ));
        let settings = SettingsStore::new(backend);
        settings.fetch_all().await;

        assert_eq!(settings.tax_rates().await, TaxRates { cgst: 12.0, sgst: 2.5 });
        assert_eq!(
            settings.get("show_bank").await,
            Some(SettingValue::Text("true".into()))
        );
        assert_eq!(
            settings.get(PAYMENT_TERMS).await,
            Some(SettingValue::Text(String::new()))
        );
        assert!(settings.payment_terms().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_defaults() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        backend.fail_next("select", None);
        let settings = SettingsStore::new(backend);
        settings.fetch_all().await;
        assert!(!settings.is_loading());
        assert_eq!(settings.all().await, default_settings());
    }

    #[tokio::test]
    async fn test_update_one_upserts_text_value() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let settings = SettingsStore::new(backend.clone());
        settings.fetch_all().await;

        settings
            .update_one(TAX_CGST, SettingValue::Number(2.5))
            .await
            .unwrap();
        assert_eq!(settings.number(TAX_CGST).await, Some(2.5));

        let stored = backend.rows(TABLE);
        let row = stored.iter().find(|r| r["setting_key"] == TAX_CGST).unwrap();
        assert_eq!(row["setting_value"], "2.5");
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_update_refetches_instead_of_restoring() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let settings = SettingsStore::new(backend.clone());
        settings.fetch_all().await;

        backend.fail_next("upsert", None);
        let err = settings
            .update_one(TAX_SGST, SettingValue::Number(14.0))
            .await
            .unwrap_err();
        assert_eq!(err.key, TAX_SGST);

        // The refetch merges server rows over current values; the server has
        // no tax_sgst row, so the optimistic value is not cleared.
        assert_eq!(backend.call_count("select"), 2);
        assert_eq!(settings.number(TAX_SGST).await, Some(14.0));
        assert_eq!(settings.number(TAX_CGST).await, Some(6.0));
    }

    #[tokio::test]
    async fn test_failed_update_of_stored_key_reverts_via_refetch() {
        let backend = Arc::new(MemoryBackend::new().with_rows(TABLE, rows()));
        let settings = SettingsStore::new(backend.clone());
        settings.fetch_all().await;

        backend.fail_next("upsert", None);
        assert!(settings
            .update_one(TAX_CGST, SettingValue::Number(1.0))
            .await
            .is_err());
        assert_eq!(settings.number(TAX_CGST).await, Some(6.0));
    }
}

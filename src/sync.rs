//! In-memory mirrors of backend tables with optimistic mutation.
//!
//! Every mutation snapshots the mirror, applies the change locally, then
//! issues the remote call. Success reconciles with the row the server
//! returned; failure restores the snapshot verbatim. The write lock is only
//! held for the local step, never across the remote call, so two racing
//! operations take independent snapshots and a late rollback can undo the
//! other operation's optimistic change.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, Query, RecordId, TableBackend};
use crate::store::types::Topic;
use crate::store::LocalStore;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// A row type mirrored by a [`SyncedCollection`].
pub trait Record:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const TABLE: &'static str;
    /// Name used in user-facing messages.
    const ENTITY: &'static str;
    const TEMP_PREFIX: &'static str;
    const ORDER_BY: Option<&'static str> = None;
    /// Stamp `created_at` / `updated_at` on writes.
    const TIMESTAMPED: bool = false;

    fn id(&self) -> &RecordId;

    fn set_id(&mut self, id: RecordId);

    /// Natural key that must be unique (case-insensitive) within the table.
    fn unique_key(&self) -> Option<&str> {
        None
    }

    /// `(field label, value)` pairs that must not be blank.
    fn required(&self) -> Vec<(&'static str, &str)> {
        Vec::new()
    }

    fn search_text(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Seed rows used when neither the backend nor the cache has any.
    fn defaults() -> Vec<Self> {
        Vec::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{field} cannot be empty.")]
    Required { field: &'static str },
    #[error("{entity} name \"{key}\" already exists.")]
    Duplicate { entity: &'static str, key: String },
    #[error("Failed to {op} {entity}: {source}")]
    Remote {
        op: &'static str,
        entity: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("Failed to delete {entity}: {source}. It may be in use by other records.")]
    DeleteRejected {
        entity: &'static str,
        #[source]
        source: BackendError,
    },
}

impl SyncError {
    /// Rejected locally, before any remote call.
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Required { .. } | SyncError::Duplicate { .. })
    }
}

/// Where a [`SyncedCollection::fetch_all`] got its rows from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Remote(usize),
    Cache(usize),
    Defaults(usize),
    Unchanged,
}

struct CacheBinding {
    store: Arc<LocalStore>,
    key: &'static str,
}

pub struct SyncedCollection<T: Record> {
    backend: Arc<dyn TableBackend>,
    items: RwLock<Vec<T>>,
    loading: AtomicBool,
    cache: Option<CacheBinding>,
    origin: u64,
    temp_seq: AtomicU64,
}

impl<T: Record> SyncedCollection<T> {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self {
            backend,
            items: RwLock::new(Vec::new()),
            loading: AtomicBool::new(true),
            cache: None,
            origin: NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed),
            temp_seq: AtomicU64::new(0),
        }
    }

    /// Mirror the list into local storage under `key` and read it back when
    /// the backend is unreachable.
    pub fn with_cache(mut self, store: Arc<LocalStore>, key: &'static str) -> Self {
        self.cache = Some(CacheBinding { store, key });
        self
    }

    pub async fn items(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn get(&self, id: &RecordId) -> Option<T> {
        self.items.read().await.iter().find(|r| r.id() == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Case-insensitive substring match over each record's search fields.
    pub async fn search(&self, term: &str) -> Vec<T> {
        let needle = term.trim().to_lowercase();
        self.items
            .read()
            .await
            .iter()
            .filter(|r| {
                needle.is_empty()
                    || r.search_text()
                        .iter()
                        .any(|f| f.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub async fn fetch_all(&self) -> FetchOutcome {
        self.loading.store(true, Ordering::SeqCst);

        let mut query = Query::new();
        if let Some(column) = T::ORDER_BY {
            query = query.order(column, true);
        }

        let outcome = match self.backend.select(T::TABLE, &query).await {
            Ok(rows) if !rows.is_empty() => {
                let records: Vec<T> = rows
                    .into_iter()
                    .filter_map(|row| match Self::decode(row) {
                        Ok(r) => Some(r),
                        Err(e) => {
                            warn!(entity = T::ENTITY, "Skipping undecodable row: {}", e);
                            None
                        }
                    })
                    .collect();
                let count = records.len();
                self.replace(records, true).await;
                FetchOutcome::Remote(count)
            }
            Ok(_) => {
                debug!(entity = T::ENTITY, "Backend returned no rows");
                self.fallback(true).await
            }
            Err(e) => {
                warn!(entity = T::ENTITY, "Fetch failed, using local fallback: {}", e);
                self.fallback(false).await
            }
        };

        self.loading.store(false, Ordering::SeqCst);
        info!(entity = T::ENTITY, ?outcome, "collection loaded");
        outcome
    }

    async fn fallback(&self, remote_empty: bool) -> FetchOutcome {
        if let Some(cached) = self.read_cache().await.filter(|c| !c.is_empty()) {
            let count = cached.len();
            self.replace(cached, false).await;
            return FetchOutcome::Cache(count);
        }

        let defaults = T::defaults();
        if remote_empty {
            let count = defaults.len();
            self.replace(defaults, true).await;
            return if count == 0 {
                FetchOutcome::Remote(0)
            } else {
                FetchOutcome::Defaults(count)
            };
        }

        if !defaults.is_empty() && self.items.read().await.is_empty() {
            let count = defaults.len();
            self.replace(defaults, true).await;
            return FetchOutcome::Defaults(count);
        }
        FetchOutcome::Unchanged
    }

    pub async fn add(&self, mut record: T) -> Result<T, SyncError> {
        Self::validate(&record)?;
        self.check_unique(&record, None).await?;

        let client_assigned = !record.id().is_unset();
        if !client_assigned {
            record.set_id(self.temp_id());
        }
        let temp_id = record.id().clone();

        let payload = Self::payload(&record, client_assigned, true).map_err(|e| {
            SyncError::Remote {
                op: "add",
                entity: T::ENTITY,
                source: e,
            }
        })?;

        let snapshot = {
            let mut items = self.items.write().await;
            let snapshot = items.clone();
            items.push(record);
            snapshot
        };
        self.persist().await;

        let result = match self.backend.insert(T::TABLE, payload).await {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => Self::decode(row),
                None => Err(BackendError::EmptyResponse(T::TABLE.to_string())),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(added) => {
                {
                    let mut items = self.items.write().await;
                    for item in items.iter_mut().filter(|i| i.id() == &temp_id) {
                        *item = added.clone();
                    }
                }
                self.persist().await;
                info!(entity = T::ENTITY, id = %added.id(), "record added");
                Ok(added)
            }
            Err(e) => {
                error!(entity = T::ENTITY, "Add failed, rolling back: {}", e);
                self.replace(snapshot, true).await;
                Err(SyncError::Remote {
                    op: "add",
                    entity: T::ENTITY,
                    source: e,
                })
            }
        }
    }

    pub async fn update(&self, record: T) -> Result<T, SyncError> {
        Self::validate(&record)?;
        self.check_unique(&record, Some(record.id())).await?;

        let id = record.id().clone();
        let patch = Self::payload(&record, false, false).map_err(|e| SyncError::Remote {
            op: "update",
            entity: T::ENTITY,
            source: e,
        })?;

        let snapshot = {
            let mut items = self.items.write().await;
            let snapshot = items.clone();
            for item in items.iter_mut().filter(|i| i.id() == &id) {
                *item = record.clone();
            }
            snapshot
        };
        self.persist().await;

        match self.backend.update(T::TABLE, &id, patch).await {
            Ok(rows) => {
                let confirmed = match rows.into_iter().next().map(Self::decode) {
                    Some(Ok(updated)) => {
                        let mut items = self.items.write().await;
                        for item in items.iter_mut().filter(|i| i.id() == updated.id()) {
                            *item = updated.clone();
                        }
                        updated
                    }
                    Some(Err(e)) => {
                        warn!(entity = T::ENTITY, %id, "Keeping local copy, server row undecodable: {}", e);
                        record
                    }
                    None => record,
                };
                self.persist().await;
                info!(entity = T::ENTITY, %id, "record updated");
                Ok(confirmed)
            }
            Err(e) => {
                error!(entity = T::ENTITY, %id, "Update failed, rolling back: {}", e);
                self.replace(snapshot, true).await;
                Err(SyncError::Remote {
                    op: "update",
                    entity: T::ENTITY,
                    source: e,
                })
            }
        }
    }

    pub async fn delete(&self, id: &RecordId) -> Result<(), SyncError> {
        let snapshot = {
            let mut items = self.items.write().await;
            let snapshot = items.clone();
            items.retain(|i| i.id() != id);
            snapshot
        };
        self.persist().await;

        if let Err(e) = self.backend.delete(T::TABLE, id).await {
            if e.is_reference_violation() {
                warn!(entity = T::ENTITY, %id, "Delete blocked by a reference");
            } else {
                error!(entity = T::ENTITY, %id, "Delete failed, rolling back: {}", e);
            }
            self.replace(snapshot, true).await;
            return Err(SyncError::DeleteRejected {
                entity: T::ENTITY,
                source: e,
            });
        }

        info!(entity = T::ENTITY, %id, "record deleted");
        Ok(())
    }

    /// Replace the mirror with the cached copy, if any. Does not write back.
    pub async fn reload_from_cache(&self) -> bool {
        match self.read_cache().await {
            Some(cached) => {
                self.replace(cached, false).await;
                true
            }
            None => false,
        }
    }

    /// Follow writes to the cached key made by other writers.
    pub fn watch_cache(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let cache = self.cache.as_ref()?;
        let mut rx = cache.store.subscribe();
        let key = cache.key;
        let origin = self.origin;
        let this: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            loop {
                let reload = match rx.recv().await {
                    Ok(event) => event.key == key && event.origin != origin,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(entity = T::ENTITY, skipped, "Change feed lagged");
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !reload {
                    continue;
                }
                match this.upgrade() {
                    Some(collection) => {
                        collection.reload_from_cache().await;
                        debug!(entity = T::ENTITY, "mirror reloaded from cache");
                    }
                    None => break,
                }
            }
        }))
    }

    fn validate(record: &T) -> Result<(), SyncError> {
        match record.required().into_iter().find(|(_, v)| v.trim().is_empty()) {
            Some((field, _)) => Err(SyncError::Required { field }),
            None => Ok(()),
        }
    }

    async fn check_unique(&self, record: &T, exclude: Option<&RecordId>) -> Result<(), SyncError> {
        let Some(key) = record.unique_key() else {
            return Ok(());
        };
        let wanted = key.to_lowercase();
        let items = self.items.read().await;
        let clash = items.iter().any(|existing| {
            Some(existing.id()) != exclude
                && existing
                    .unique_key()
                    .map(|k| k.to_lowercase() == wanted)
                    .unwrap_or(false)
        });
        if clash {
            return Err(SyncError::Duplicate {
                entity: T::ENTITY,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn temp_id(&self) -> RecordId {
        let n = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        RecordId::Text(format!(
            "{}_{}_{}",
            T::TEMP_PREFIX,
            chrono::Utc::now().timestamp_millis(),
            n
        ))
    }

    /// Row body for insert/update. Generated temporary ids never leave the process.
    fn payload(record: &T, keep_id: bool, insert: bool) -> Result<Value, BackendError> {
        let mut row = serde_json::to_value(record)?;
        if let Some(map) = row.as_object_mut() {
            if !keep_id {
                map.remove("id");
            }
            map.remove("created_at");
            if T::TIMESTAMPED {
                let now = Value::from(chrono::Utc::now().to_rfc3339());
                if insert {
                    map.insert("created_at".to_string(), now.clone());
                }
                map.insert("updated_at".to_string(), now);
            }
        }
        Ok(row)
    }

    fn decode(row: Value) -> Result<T, BackendError> {
        Ok(serde_json::from_value(row)?)
    }

    async fn replace(&self, records: Vec<T>, persist: bool) {
        *self.items.write().await = records;
        if persist {
            self.persist().await;
        }
    }

    async fn read_cache(&self) -> Option<Vec<T>> {
        let cache = self.cache.as_ref()?;
        match cache.store.get_json::<Vec<T>>(cache.key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(entity = T::ENTITY, "Ignoring unreadable cache: {:#}", e);
                None
            }
        }
    }

    /// Best-effort write-through of a non-empty mirror.
    async fn persist(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let items = self.items.read().await.clone();
        if items.is_empty() {
            return;
        }
        if let Err(e) = cache
            .store
            .put_json(cache.key, &items, Topic::Storage, self.origin)
            .await
        {
            warn!(entity = T::ENTITY, "Cache write failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::records::{Client, Technical};
    use crate::store::types::CLIENTS_KEY;
    use serde_json::json;

    fn client_rows() -> Vec<Value> {
        vec![
            json!({ "id": 1, "client_name": "Indus Towers Ltd.", "created_at": "2026-01-01" }),
            json!({ "id": 2, "client_name": "Larsen & Toubro", "email": "ops@lt.in", "created_at": "2026-01-02" }),
        ]
    }

    fn clients(backend: &Arc<MemoryBackend>) -> SyncedCollection<Client> {
        SyncedCollection::new(backend.clone() as Arc<dyn TableBackend>)
    }

    async fn store() -> (tempfile::TempDir, Arc<LocalStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn test_fetch_all_loads_remote_rows() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        assert!(coll.is_loading());

        assert_eq!(coll.fetch_all().await, FetchOutcome::Remote(2));
        assert!(!coll.is_loading());
        let items = coll.items().await;
        assert_eq!(items[0].name, "Indus Towers Ltd.");
        assert_eq!(items[1].email, "ops@lt.in");
    }

    #[tokio::test]
    async fn test_fetch_failure_uses_cache_then_defaults() {
        let (_dir, store) = store().await;
        let backend = Arc::new(MemoryBackend::new());

        backend.fail_next("select", None);
        let coll = clients(&backend).with_cache(store.clone(), CLIENTS_KEY);
        assert_eq!(coll.fetch_all().await, FetchOutcome::Defaults(3));
        assert!(!coll.is_loading());

        let cached = vec![Client {
            id: RecordId::from("C7"),
            ..Client::new("Cached Co", "", "", "")
        }];
        store
            .put_json(CLIENTS_KEY, &cached, Topic::Storage, 0)
            .await
            .unwrap();
        backend.fail_next("select", None);
        let coll = clients(&backend).with_cache(store, CLIENTS_KEY);
        assert_eq!(coll.fetch_all().await, FetchOutcome::Cache(1));
        assert_eq!(coll.items().await, cached);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_cache_keeps_current_items() {
        let backend = Arc::new(MemoryBackend::new().with_rows(
            "technicals",
            vec![json!({ "id": 1, "text": "Core cutting", "type": "civil" })],
        ));
        let coll: SyncedCollection<Technical> = SyncedCollection::new(backend.clone());
        coll.fetch_all().await;

        backend.fail_next("select", None);
        assert_eq!(coll.fetch_all().await, FetchOutcome::Unchanged);
        assert_eq!(coll.len().await, 1);
        assert!(!coll.is_loading());
    }

    #[tokio::test]
    async fn test_add_replaces_temporary_id_with_server_row() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;

        let added = coll
            .add(Client::new("Bharat Electronics", "Bengaluru", "", ""))
            .await
            .unwrap();
        assert!(matches!(added.id, RecordId::Int(_)));

        let items = coll.items().await;
        assert_eq!(items.len(), 3);
        assert!(items
            .iter()
            .all(|c| !c.id.to_string().starts_with("cli_")));
        assert_eq!(items[2], added);

        let inserted = backend.rows("clients");
        assert_eq!(inserted[2]["client_name"], "Bharat Electronics");
        assert!(inserted[2].get("updated_at").is_some());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_without_network_call() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;

        let err = coll
            .add(Client::new("indus towers ltd.", "", "", ""))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Client name \"indus towers ltd.\" already exists."
        );
        assert_eq!(backend.call_count("insert"), 0);
        assert_eq!(coll.len().await, 2);
    }

    #[tokio::test]
    async fn test_blank_required_field_rejected_before_network() {
        let backend = Arc::new(MemoryBackend::new());
        let coll: SyncedCollection<Technical> = SyncedCollection::new(backend.clone());
        let err = coll.add(Technical::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Required { field: "Text" }));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_failure_rolls_back() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;
        let before = coll.items().await;

        backend.fail_next("insert", Some("23505"));
        let err = coll.add(Client::new("New Co", "", "", "")).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote { op: "add", .. }));
        assert_eq!(coll.items().await, before);
    }

    #[tokio::test]
    async fn test_add_without_returned_row_rolls_back() {
        let backend = Arc::new(MemoryBackend::new());
        backend.return_empty_inserts();
        let coll: SyncedCollection<Technical> = SyncedCollection::new(backend.clone());

        let result = coll
            .add(Technical {
                text: "Rebound hammer test".into(),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
        assert!(coll.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_reconciles_and_allows_own_name() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;

        let mut edited = coll.get(&RecordId::Int(1)).await.unwrap();
        edited.name = "INDUS TOWERS LTD.".to_string();
        edited.phone = "080-5555".to_string();
        let updated = coll.update(edited).await.unwrap();

        assert_eq!(updated.phone, "080-5555");
        assert_eq!(coll.items().await[0].name, "INDUS TOWERS LTD.");
        let row = &backend.rows("clients")[0];
        assert_eq!(row["phone"], "080-5555");
        assert_eq!(row["created_at"], "2026-01-01");
    }

    #[tokio::test]
    async fn test_update_into_other_name_rejected() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;

        let mut edited = coll.get(&RecordId::Int(1)).await.unwrap();
        edited.name = "larsen & toubro".to_string();
        assert!(coll.update(edited).await.unwrap_err().is_validation());
        assert_eq!(backend.call_count("update"), 0);
    }

    #[tokio::test]
    async fn test_update_failure_rolls_back() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;
        let before = coll.items().await;

        let mut edited = before[1].clone();
        edited.email = "new@lt.in".to_string();
        backend.fail_next("update", None);
        assert!(coll.update(edited).await.is_err());
        assert_eq!(coll.items().await, before);
    }

    #[tokio::test]
    async fn test_delete_and_rejected_delete() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;
        let before = coll.items().await;

        backend.fail_next("delete", Some("23503"));
        let err = coll.delete(&RecordId::Int(1)).await.unwrap_err();
        assert!(err.to_string().contains("may be in use"));
        assert_eq!(coll.items().await, before);

        coll.delete(&RecordId::Int(1)).await.unwrap();
        assert_eq!(coll.len().await, 1);
        assert_eq!(backend.rows("clients").len(), 1);
    }

    #[tokio::test]
    async fn test_mutations_write_through_cache() {
        let (_dir, store) = store().await;
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend).with_cache(store.clone(), CLIENTS_KEY);
        coll.fetch_all().await;
        coll.add(Client::new("Cached Later", "", "", "")).await.unwrap();

        let cached: Vec<Client> = store.get_json(CLIENTS_KEY).await.unwrap().unwrap();
        assert_eq!(cached, coll.items().await);
    }

    #[tokio::test]
    async fn test_watch_cache_follows_foreign_writes() {
        let (_dir, store) = store().await;
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = Arc::new(clients(&backend).with_cache(store.clone(), CLIENTS_KEY));
        coll.fetch_all().await;
        let handle = coll.watch_cache().unwrap();

        let foreign = vec![Client {
            id: RecordId::from("X1"),
            ..Client::new("Written Elsewhere", "", "", "")
        }];
        store
            .put_json(CLIENTS_KEY, &foreign, Topic::Storage, 0)
            .await
            .unwrap();

        for _ in 0..50 {
            if coll.items().await == foreign {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(coll.items().await, foreign);
        handle.abort();
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let backend = Arc::new(MemoryBackend::new().with_rows("clients", client_rows()));
        let coll = clients(&backend);
        coll.fetch_all().await;

        assert_eq!(coll.search("TOWERS").await.len(), 1);
        assert_eq!(coll.search("ops@").await[0].name, "Larsen & Toubro");
        assert_eq!(coll.search("").await.len(), 2);
        assert!(coll.search("nothing").await.is_empty());
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use poise::serenity_prelude as serenity;
use tokio::sync::{Mutex, RwLock};

use crate::backend::TableBackend;
use crate::docid::DocIdGenerator;
use crate::notify::{Notifier, DEFAULT_INTERVAL};
use crate::quote::saved::SavedRecords;
use crate::quote::QuotationDraft;
use crate::records::{Client, Department, HsnCode, Technical, Term};
use crate::session::SessionContext;
use crate::settings::SettingsStore;
use crate::store::types::SESSION_KEY;
use crate::store::LocalStore;
use crate::sync::SyncedCollection;

/// Process configuration read from the environment (and `.env`).
pub struct ConsoleConfig {
    pub discord_token: String,
    pub guild_id: Option<serenity::GuildId>,
    pub store_dir: PathBuf,
    pub notify_interval: Duration,
    pub doc_sequence: String,
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self> {
        let discord_token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
        let guild_id = dotenv::var("DISCORD_GUILD_ID")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(serenity::GuildId::new);
        let store_dir = dotenv::var("LOCAL_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/local"));
        let notify_interval = dotenv::var("NOTIFY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INTERVAL);
        let doc_sequence = dotenv::var("DOC_SEQUENCE").unwrap_or_else(|_| "random".to_string());

        Ok(Self {
            discord_token,
            guild_id,
            store_dir,
            notify_interval,
            doc_sequence,
        })
    }
}

pub struct AppState {
    pub backend: Arc<dyn TableBackend>,
    pub store: Arc<LocalStore>,
    pub notifier: Option<Arc<Notifier>>,
    pub settings: Arc<SettingsStore>,
    pub clients: Arc<SyncedCollection<Client>>,
    pub departments: Arc<SyncedCollection<Department>>,
    pub hsn_codes: Arc<SyncedCollection<HsnCode>>,
    pub technicals: Arc<SyncedCollection<Technical>>,
    pub terms: Arc<SyncedCollection<Term>>,
    pub saved: Arc<SavedRecords>,
    pub doc_ids: Arc<DocIdGenerator>,
    sessions: RwLock<HashMap<u64, Arc<SessionContext>>>,
    drafts: Mutex<HashMap<u64, QuotationDraft>>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn TableBackend>,
        store: Arc<LocalStore>,
        notifier: Option<Arc<Notifier>>,
        clients: Arc<SyncedCollection<Client>>,
        doc_ids: DocIdGenerator,
    ) -> Self {
        Self {
            settings: Arc::new(SettingsStore::new(backend.clone())),
            departments: Arc::new(SyncedCollection::new(backend.clone())),
            hsn_codes: Arc::new(SyncedCollection::new(backend.clone())),
            technicals: Arc::new(SyncedCollection::new(backend.clone())),
            terms: Arc::new(SyncedCollection::new(backend.clone())),
            saved: Arc::new(SavedRecords::new(backend.clone())),
            doc_ids: Arc::new(doc_ids),
            backend,
            store,
            notifier,
            clients,
            sessions: RwLock::new(HashMap::new()),
            drafts: Mutex::new(HashMap::new()),
        }
    }

    /// Login state for one operator, restored from local storage on first use.
    pub async fn session_for(&self, user_id: u64) -> Arc<SessionContext> {
        if let Some(session) = self.sessions.read().await.get(&user_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&user_id) {
            return session.clone();
        }
        let session = Arc::new(
            SessionContext::new(self.backend.clone(), self.store.clone(), self.notifier.clone())
                .with_storage_key(format!("{}/{}", SESSION_KEY, user_id)),
        );
        session.restore().await;
        sessions.insert(user_id, session.clone());
        session
    }

    /// Run `f` against the operator's open draft, if there is one.
    pub async fn with_draft<R>(
        &self,
        user_id: u64,
        f: impl FnOnce(&mut QuotationDraft) -> R,
    ) -> Option<R> {
        self.drafts.lock().await.get_mut(&user_id).map(f)
    }

    /// Replace the operator's draft. Returns the one it replaced.
    pub async fn open_draft(&self, user_id: u64, draft: QuotationDraft) -> Option<QuotationDraft> {
        self.drafts.lock().await.insert(user_id, draft)
    }

    pub async fn close_draft(&self, user_id: u64) -> Option<QuotationDraft> {
        self.drafts.lock().await.remove(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;

pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use types::{ChangeEvent, SiteContent, Topic, SITE_CONTENT_KEY};

// Key prefix, no trailing slash
const LOCAL_PREFIX: &str = "local";

/// Origin used for writes that don't come from a synchronized collection.
pub const ORIGIN_CONSOLE: u64 = 0;

fn local_key(name: &str) -> String {
    format!("{}/{}", LOCAL_PREFIX, name)
}

/// Durable key/value store for JSON blobs that outlive a process: the
/// session, offline record caches and site content.
pub struct LocalStore {
    storage: Storage,
    /// Held from snapshot to commit so concurrent writers don't race on versions.
    write_lock: Mutex<()>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl LocalStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let storage = Storage::load(data_dir.to_path_buf(), vec![LOCAL_PREFIX.to_string()])
            .await
            .context("Failed to init cnidarium storage")?;
        let (changes, _) = broadcast::channel(64);
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub async fn get_raw(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let snapshot = self.storage.latest_snapshot();
        snapshot.get_raw(&local_key(name)).await
    }

    /// Read and decode a JSON value. A stored value that fails to decode is an error.
    pub async fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.get_raw(name).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt local value for {}", name))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn put_json<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        topic: Topic,
        origin: u64,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value).context("serialize local value")?;
        {
            let _guard = self.write_lock.lock().await;
            let mut delta = StateDelta::new(self.storage.latest_snapshot());
            delta.put_raw(local_key(name), bytes);
            self.storage.commit(delta).await?;
        }
        debug!(key = name, topic = topic.name(), "local value stored");
        self.publish(topic, name, origin);
        Ok(())
    }

    pub async fn remove(&self, name: &str, topic: Topic, origin: u64) -> Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let mut delta = StateDelta::new(self.storage.latest_snapshot());
            delta.delete(local_key(name));
            self.storage.commit(delta).await?;
        }
        debug!(key = name, "local value removed");
        self.publish(topic, name, origin);
        Ok(())
    }

    fn publish(&self, topic: Topic, name: &str, origin: u64) {
        // No subscribers is fine.
        let _ = self.changes.send(ChangeEvent {
            topic,
            key: name.to_string(),
            origin,
        });
    }

    /// Site content, falling back to the built-in defaults when absent or unreadable.
    pub async fn site_content(&self) -> SiteContent {
        match self.get_json::<SiteContent>(SITE_CONTENT_KEY).await {
            Ok(Some(content)) => content,
            Ok(None) => SiteContent::default(),
            Err(e) => {
                warn!("Falling back to default site content: {:#}", e);
                SiteContent::default()
            }
        }
    }

    pub async fn save_site_content(&self, content: &SiteContent) -> Result<()> {
        self.put_json(SITE_CONTENT_KEY, content, Topic::Content, ORIGIN_CONSOLE)
            .await
    }
}

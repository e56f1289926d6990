//! Console login state.
//!
//! A session is either absent (anonymous) or present (authenticated); there
//! is no intermediate state. The session object is mirrored to local storage
//! so a restart keeps the user logged in.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::backend::{BackendError, Query, RecordId, TableBackend};
use crate::notify::Notifier;
use crate::store::types::{Topic, SESSION_KEY};
use crate::store::{LocalStore, ORIGIN_CONSOLE};

const USERS_TABLE: &str = "app_users";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Standard,
    #[serde(other)]
    Other,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Standard => "standard",
            Role::Other => "other",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: RecordId,
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: RecordId,
    username: String,
    full_name: Option<String>,
    role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(&'static str),
    #[error("Not logged in")]
    NotAuthenticated,
    #[error("Backend error: {0}")]
    Remote(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct SessionContext {
    backend: Arc<dyn TableBackend>,
    store: Arc<LocalStore>,
    notifier: Option<Arc<Notifier>>,
    storage_key: String,
    current: RwLock<Option<Session>>,
}

impl SessionContext {
    pub fn new(
        backend: Arc<dyn TableBackend>,
        store: Arc<LocalStore>,
        notifier: Option<Arc<Notifier>>,
    ) -> Self {
        Self {
            backend,
            store,
            notifier,
            storage_key: SESSION_KEY.to_string(),
            current: RwLock::new(None),
        }
    }

    /// Persist under a different key, e.g. one session per console operator.
    pub fn with_storage_key(mut self, key: String) -> Self {
        self.storage_key = key;
        self
    }

    /// Load a previously persisted session. Unreadable values are discarded.
    pub async fn restore(&self) -> Option<Session> {
        let restored = match self.store.get_json::<Session>(&self.storage_key).await {
            Ok(session) => session,
            Err(e) => {
                error!(key = %self.storage_key, "Failed to parse stored session: {:#}", e);
                if let Err(e) = self
                    .store
                    .remove(&self.storage_key, Topic::Storage, ORIGIN_CONSOLE)
                    .await
                {
                    warn!("Could not clear stored session: {:#}", e);
                }
                None
            }
        };
        *self.current.write().await = restored.clone();
        restored
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn is_admin(&self) -> bool {
        self.has_role(Role::Admin).await
    }

    pub async fn is_standard(&self) -> bool {
        self.has_role(Role::Standard).await
    }

    async fn has_role(&self, role: Role) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.role == role)
            .unwrap_or(false)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SessionError> {
        let query = Query::new()
            .eq("username", username)
            .eq("password", password)
            .eq("is_active", true);
        let rows = self.backend.select(USERS_TABLE, &query).await?;

        // Exactly one row, or it's not a login.
        if rows.len() != 1 {
            warn!(username, matches = rows.len(), "Login rejected");
            return Err(SessionError::InvalidCredentials);
        }
        let row = rows
            .into_iter()
            .next()
            .ok_or(SessionError::InvalidCredentials)?;
        let user: UserRow = serde_json::from_value(row).map_err(BackendError::from)?;

        let session = Session {
            id: user.id,
            full_name: user.full_name.unwrap_or_else(|| user.username.clone()),
            username: user.username,
            role: user.role,
        };

        self.store
            .put_json(&self.storage_key, &session, Topic::Storage, ORIGIN_CONSOLE)
            .await?;
        *self.current.write().await = Some(session.clone());
        info!(username = %session.username, role = %session.role, "Login succeeded");

        if let Some(notifier) = &self.notifier {
            notifier.notify(login_message(&session));
        }
        Ok(session)
    }

    /// Drop the in-memory session first, then the stored copy. No remote call.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let previous = self.current.write().await.take();
        self.store
            .remove(&self.storage_key, Topic::Storage, ORIGIN_CONSOLE)
            .await?;
        if let Some(session) = previous {
            info!(username = %session.username, "Logged out");
        }
        Ok(())
    }

    pub async fn update_password(&self, password: &str, confirm: &str) -> Result<(), SessionError> {
        if password != confirm {
            return Err(SessionError::Validation("Passwords don't match"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Validation(
                "Password must be at least 6 characters",
            ));
        }
        let session = self.current().await.ok_or(SessionError::NotAuthenticated)?;

        self.backend
            .update(
                USERS_TABLE,
                &session.id,
                json!({
                    "password": password,
                    "updated_at": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        info!(username = %session.username, "Password updated");
        Ok(())
    }
}

/// Backslash-escape Telegram legacy Markdown entity markers.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn login_message(session: &Session) -> String {
    format!(
        "*Console login*\nUser: {} (`{}`)\nRole: {}\nTime: {}",
        escape_markdown(&session.full_name),
        // Nothing can be escaped inside a code span.
        session.username.replace('`', "'"),
        session.role,
        chrono::Local::now().format("%d %b %Y %H:%M:%S")
    )
}

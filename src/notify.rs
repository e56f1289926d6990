use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Delivers one Markdown-formatted message somewhere.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

pub struct TelegramTransport {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramTransport {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            bot_token,
            chat_id,
        })
    }

    /// `None` unless both `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` are set.
    pub fn from_env() -> Result<Option<Self>> {
        let token = dotenv::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty());
        let chat_id = dotenv::var("TELEGRAM_CHAT_ID").ok().filter(|s| !s.is_empty());
        match (token, chat_id) {
            (Some(token), Some(chat_id)) => Ok(Some(Self::new(token, chat_id)?)),
            _ => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram returned {}: {}", status, detail);
        }
        Ok(())
    }
}

/// Fire-and-forget sender that lets at most one message through per interval.
pub struct Notifier {
    transport: Arc<dyn MessageTransport>,
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MessageTransport>, min_interval: Duration) -> Self {
        Self {
            transport,
            min_interval,
            last_sent: Mutex::new(None),
        }
    }

    /// Claim the send slot if the interval has elapsed since the last claim.
    fn try_reserve(&self) -> bool {
        let mut last = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Spawn the send and return immediately. Returns `None` when rate-limited.
    /// Delivery errors are logged, never returned.
    pub fn notify(&self, text: String) -> Option<JoinHandle<()>> {
        if !self.try_reserve() {
            debug!("Notification suppressed by rate limit");
            return None;
        }
        let transport = Arc::clone(&self.transport);
        Some(tokio::spawn(async move {
            if let Err(e) = transport.send(&text).await {
                warn!("Notification failed: {:#}", e);
            }
        }))
    }
}

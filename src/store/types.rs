use serde::{Deserialize, Serialize};

/// Logged-in session of the console user.
pub const SESSION_KEY: &str = "app_session";
/// Offline copy of the client list.
pub const CLIENTS_KEY: &str = "clients";
/// Site-wide contact details printed on documents.
pub const SITE_CONTENT_KEY: &str = "site_content";

/// Change-notification topics. `Storage` covers record caches and the
/// session; `Content` covers site content blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Storage,
    Content,
}

impl Topic {
    pub fn name(self) -> &'static str {
        match self {
            Topic::Storage => "storage",
            Topic::Content => "storage-content",
        }
    }
}

/// Published after every committed write or removal.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub topic: Topic,
    pub key: String,
    /// Writer identity, so subscribers can skip their own writes.
    pub origin: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDetails {
    pub site_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub address: String,
    pub footer_about: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteContent {
    pub global: SiteDetails,
}

impl Default for SiteContent {
    fn default() -> Self {
        Self {
            global: SiteDetails {
                site_name: "EDGE2 - MTR".to_string(),
                contact_phone: "+919999999999".to_string(),
                contact_email: "edge2@gmail.com".to_string(),
                address: "EDGE2 - MTR, Karnataka".to_string(),
                footer_about: "EDGE2 - MTR".to_string(),
            },
        }
    }
}

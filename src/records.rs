//! Entity definitions mirrored from the backend tables.

use serde::{Deserialize, Deserializer, Serialize};

use crate::backend::RecordId;
use crate::sync::Record;

/// Columns come back as `null` when empty.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Billing client. Written with the table's column names; read through
/// [`ClientRow`] so cached entries carrying both column and camelCase names
/// also decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ClientRow")]
pub struct Client {
    pub id: RecordId,
    #[serde(rename = "client_name")]
    pub name: String,
    #[serde(rename = "client_address")]
    pub address: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
struct ClientRow {
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default, rename = "clientName")]
    client_name_camel: Option<String>,
    #[serde(default)]
    client_address: Option<String>,
    #[serde(default, rename = "clientAddress")]
    client_address_camel: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default, rename = "createdAt")]
    created_at_camel: Option<String>,
}

/// Column value first, camelCase copy second; blank counts as missing.
fn first_filled(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|s| !s.is_empty())
        .or(fallback.filter(|s| !s.is_empty()))
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: row.id.unwrap_or_default(),
            name: first_filled(row.client_name, row.client_name_camel).unwrap_or_default(),
            address: first_filled(row.client_address, row.client_address_camel).unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            phone: row.phone.unwrap_or_default(),
            created_at: first_filled(row.created_at, row.created_at_camel),
        }
    }
}

impl Client {
    pub fn new(name: &str, address: &str, email: &str, phone: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            ..Default::default()
        }
    }
}

impl Record for Client {
    const TABLE: &'static str = "clients";
    const ENTITY: &'static str = "Client";
    const TEMP_PREFIX: &'static str = "cli";
    const ORDER_BY: Option<&'static str> = Some("created_at");
    const TIMESTAMPED: bool = true;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<&str> {
        Some(self.name.as_str()).filter(|n| !n.is_empty())
    }

    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("Client name", self.name.as_str())]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.email.as_str()]
    }

    fn defaults() -> Vec<Self> {
        [
            ("C1", "Indus Towers Ltd."),
            ("C2", "Reliance Jio Infocomm Ltd."),
            ("C3", "ATC Telecom Infrastructure Pvt. Ltd."),
        ]
        .into_iter()
        .map(|(id, name)| Client {
            id: RecordId::from(id),
            name: name.to_string(),
            ..Default::default()
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Department {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

impl Record for Department {
    const TABLE: &'static str = "departments";
    const ENTITY: &'static str = "Department";
    const TEMP_PREFIX: &'static str = "dep";
    const ORDER_BY: Option<&'static str> = Some("name");

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("Department name", self.name.as_str())]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.name.as_str()]
    }
}

/// HSN/SAC classification code printed against line items.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HsnCode {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, deserialize_with = "nullable")]
    pub code: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
}

impl Record for HsnCode {
    const TABLE: &'static str = "hsn_codes";
    const ENTITY: &'static str = "HSN code";
    const TEMP_PREFIX: &'static str = "hsn";
    const ORDER_BY: Option<&'static str> = Some("code");

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("HSN/SAC code", self.code.as_str()), ("Description", self.description.as_str())]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.code.as_str(), self.description.as_str()]
    }
}

/// Technical clause printed under a document's item table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Technical {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
}

impl Record for Technical {
    const TABLE: &'static str = "technicals";
    const ENTITY: &'static str = "Technical";
    const TEMP_PREFIX: &'static str = "tech";
    const ORDER_BY: Option<&'static str> = Some("id");
    const TIMESTAMPED: bool = true;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("Text", self.text.as_str())]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.text.as_str(), self.kind.as_str()]
    }
}

/// Terms and conditions clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    #[serde(rename = "type", default = "general_kind", deserialize_with = "term_kind")]
    pub kind: String,
}

fn general_kind() -> String {
    "general".to_string()
}

/// `null` or blank reads as `general`.
fn term_kind<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(general_kind))
}

impl Default for Term {
    fn default() -> Self {
        Self {
            id: RecordId::unset(),
            text: String::new(),
            kind: general_kind(),
        }
    }
}

impl Record for Term {
    const TABLE: &'static str = "terms_and_conditions";
    const ENTITY: &'static str = "Term";
    const TEMP_PREFIX: &'static str = "term";
    const ORDER_BY: Option<&'static str> = Some("id");
    const TIMESTAMPED: bool = true;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("Text", self.text.as_str())]
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.text.as_str(), self.kind.as_str()]
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::RecordId;

use crate::types::{TenantId, UserId};

/// Which of the two historical `api_keys` column layouts a row uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyShape {
    /// `key` + `advertiser_id` + `active` (+ `last_used_at`).
    Primary,
    /// `key_value` + `user_id` + `is_active` (+ `last_used`).
    Legacy,
}

impl KeyShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Legacy => "legacy",
        }
    }
}

/// Credential row read through the primary column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyRecord {
    /// Owning advertiser. Nullable in practice even though the layout
    /// expects it.
    #[serde(default)]
    pub advertiser_id: Option<TenantId>,
    /// Missing is treated as inactive.
    #[serde(default)]
    pub active: Option<bool>,
}

impl PrimaryKeyRecord {
    pub fn is_active(&self) -> bool {
        self.active == Some(true)
    }
}

/// Credential row read through the legacy column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyKeyRecord {
    #[serde(default)]
    pub advertiser_id: Option<TenantId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl LegacyKeyRecord {
    pub fn is_active(&self) -> bool {
        self.is_active == Some(true)
    }
}

/// Raw `advertisers` row as stored by the datastore.
///
/// All descriptive columns are nullable here; normalization into a
/// `TenantContext` happens in the context resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertiserRow {
    pub advertiser_id: TenantId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub marketplace: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    /// Free-form metadata object (country/currency codes, timezone, ...).
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Payload for inserting an advertiser (admin commands and tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertiserCreate {
    pub id: TenantId,
    pub user_id: UserId,
    pub profile_id: String,
    pub account_name: String,
    pub marketplace: String,
    pub account_type: String,
    /// Defaults to now.
    pub connected_since: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

/// Payload for issuing a primary-layout API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCreate {
    pub key: String,
    pub advertiser_id: TenantId,
    pub active: bool,
}

/// Payload for a legacy-layout API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyApiKeyCreate {
    pub key_value: String,
    pub user_id: Option<UserId>,
    pub advertiser_id: Option<TenantId>,
    pub is_active: bool,
}

/// Summary row used by the key listing command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySummary {
    pub id: RecordId,
    #[serde(default)]
    pub advertiser_id: Option<TenantId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub has_key: bool,
}

impl ApiKeySummary {
    pub fn shape(&self) -> KeyShape {
        if self.has_key {
            KeyShape::Primary
        } else {
            KeyShape::Legacy
        }
    }

    pub fn enabled(&self) -> bool {
        match self.shape() {
            KeyShape::Primary => self.active == Some(true),
            KeyShape::Legacy => self.is_active == Some(true),
        }
    }
}

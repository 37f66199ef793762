//! Tenant context for request-scoped identity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::auth::error::AuthError;
use crate::auth::repository::CredentialRepository;
use crate::db::AdvertiserRow;
use crate::types::{TenantId, UserId};

pub const DEFAULT_COUNTRY_CODE: &str = "Unknown";
pub const DEFAULT_CURRENCY_CODE: &str = "USD";

/// Locale metadata of a tenant, with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMetadata {
    pub country_code: String,
    pub currency_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Every other metadata key, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TenantMetadata {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            currency_code: DEFAULT_CURRENCY_CODE.to_string(),
            timezone: None,
            extra: Map::new(),
        }
    }
}

impl TenantMetadata {
    /// Normalize a raw metadata value. Non-objects count as empty.
    pub fn from_value(value: Option<Value>) -> Self {
        let mut map = match value {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let mut take = |key: &str| match map.remove(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        let country_code = take("countryCode").unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string());
        let currency_code = take("currencyCode").unwrap_or_else(|| DEFAULT_CURRENCY_CODE.to_string());
        let timezone = take("timezone");

        Self {
            country_code,
            currency_code,
            timezone,
            extra: map,
        }
    }
}

/// Normalized, read-only view of an advertiser account.
///
/// Built once per authentication and handed to tool handlers; nothing here
/// writes it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub id: TenantId,
    pub user_id: Option<UserId>,
    pub account_name: Option<String>,
    pub marketplace: Option<String>,
    pub account_type: Option<String>,
    pub profile_id: Option<String>,
    pub metadata: TenantMetadata,
}

impl TenantContext {
    pub fn from_row(row: AdvertiserRow) -> Self {
        Self {
            id: row.advertiser_id,
            user_id: row.user_id.filter(|u| !u.as_str().is_empty()),
            account_name: present(row.account_name),
            marketplace: present(row.marketplace),
            account_type: present(row.account_type),
            profile_id: present(row.profile_id),
            metadata: TenantMetadata::from_value(row.metadata),
        }
    }

    /// Display name used for ordering; missing names sort first.
    pub fn sort_name(&self) -> &str {
        self.account_name.as_deref().unwrap_or("")
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Loads tenant rows and normalizes them into [`TenantContext`]s.
pub struct ContextResolver {
    repo: Arc<dyn CredentialRepository>,
}

impl ContextResolver {
    pub fn new(repo: Arc<dyn CredentialRepository>) -> Self {
        Self { repo }
    }

    /// Resolve the context of a tenant a credential points at.
    ///
    /// A missing tenant means the credential table references a row that
    /// does not exist, which is reported as an internal inconsistency.
    pub async fn resolve(&self, tenant_id: &TenantId) -> Result<TenantContext, AuthError> {
        match self.repo.find_advertiser(tenant_id).await? {
            Some(row) => Ok(TenantContext::from_row(row)),
            None => {
                error!(
                    tenant_id = %tenant_id,
                    "Credential references a tenant that does not exist"
                );
                Err(AuthError::ReferentialInconsistency {
                    tenant_id: tenant_id.clone(),
                })
            }
        }
    }

    /// The first connected tenant, if any.
    pub async fn first_context(&self) -> Result<Option<TenantContext>, AuthError> {
        Ok(self.repo.first_advertiser().await?.map(TenantContext::from_row))
    }

    /// All tenants, sorted by display name.
    pub async fn list_contexts(&self) -> Result<Vec<TenantContext>, AuthError> {
        let mut contexts: Vec<TenantContext> = self
            .repo
            .list_advertisers()
            .await?
            .into_iter()
            .map(TenantContext::from_row)
            .collect();
        contexts.sort_by(|a, b| a.sort_name().cmp(b.sort_name()));
        Ok(contexts)
    }
}

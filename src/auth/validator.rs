//! Credential validation across the two `api_keys` column layouts.
//!
//! Validation runs an ordered chain of [`KeyLookup`] strategies and stops at
//! the first one that recognizes the credential. The decision is then made on
//! the normalized [`CredentialRecord`], so the layouts differ only in how they
//! are read.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::auth::error::{AuthError, InvalidCredential};
use crate::auth::repository::{CredentialRepository, RepoFuture};
use crate::db::KeyShape;
use crate::types::{KeyFingerprint, TenantId, UserId};

/// A credential as recognized by one lookup strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub shape: KeyShape,
    pub active: bool,
    pub tenant_id: Option<TenantId>,
    pub owner_user_id: Option<UserId>,
}

/// One way of reading a credential out of the datastore.
pub trait KeyLookup: Send + Sync {
    fn shape(&self) -> KeyShape;

    fn lookup<'a>(
        &'a self,
        repo: &'a dyn CredentialRepository,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<CredentialRecord>>;
}

/// `key` / `advertiser_id` / `active`.
pub struct PrimaryKeyLookup;

impl KeyLookup for PrimaryKeyLookup {
    fn shape(&self) -> KeyShape {
        KeyShape::Primary
    }

    fn lookup<'a>(
        &'a self,
        repo: &'a dyn CredentialRepository,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<CredentialRecord>> {
        Box::pin(async move {
            let record = repo.find_by_primary_key(credential).await?;
            Ok(record.map(|r| CredentialRecord {
                shape: KeyShape::Primary,
                active: r.is_active(),
                tenant_id: non_empty(r.advertiser_id),
                owner_user_id: None,
            }))
        })
    }
}

/// `key_value` / `user_id` / `is_active`.
pub struct LegacyKeyLookup;

impl KeyLookup for LegacyKeyLookup {
    fn shape(&self) -> KeyShape {
        KeyShape::Legacy
    }

    fn lookup<'a>(
        &'a self,
        repo: &'a dyn CredentialRepository,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<CredentialRecord>> {
        Box::pin(async move {
            let record = repo.find_by_legacy_key(credential).await?;
            Ok(record.map(|r| CredentialRecord {
                shape: KeyShape::Legacy,
                active: r.is_active(),
                tenant_id: non_empty(r.advertiser_id),
                owner_user_id: r.user_id.filter(|u| !u.as_str().is_empty()),
            }))
        })
    }
}

fn non_empty(id: Option<TenantId>) -> Option<TenantId> {
    id.filter(|t| !t.as_str().is_empty())
}

/// Result of validating a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvalidCredential>,
}

impl KeyValidation {
    pub fn valid(tenant_id: TenantId) -> Self {
        Self {
            valid: true,
            tenant_id: Some(tenant_id),
            error: None,
        }
    }

    pub fn invalid(reason: InvalidCredential) -> Self {
        Self {
            valid: false,
            tenant_id: None,
            error: Some(reason),
        }
    }
}

impl Serialize for InvalidCredential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.reason())
    }
}

pub struct KeyValidator {
    repo: Arc<dyn CredentialRepository>,
    lookups: Vec<Box<dyn KeyLookup>>,
}

impl KeyValidator {
    /// Validator with the standard chain: primary layout, then legacy layout.
    pub fn new(repo: Arc<dyn CredentialRepository>) -> Self {
        Self::with_lookups(repo, vec![Box::new(PrimaryKeyLookup), Box::new(LegacyKeyLookup)])
    }

    pub fn with_lookups(repo: Arc<dyn CredentialRepository>, lookups: Vec<Box<dyn KeyLookup>>) -> Self {
        Self { repo, lookups }
    }

    /// Decide whether `credential` grants access and to which tenant.
    ///
    /// Invalid credentials are `Ok` with `valid == false`; `Err` is reserved
    /// for failures the caller may want to retry or report as internal.
    pub async fn validate(&self, credential: &str) -> Result<KeyValidation, AuthError> {
        if credential.trim().is_empty() {
            return Ok(KeyValidation::invalid(InvalidCredential::Missing));
        }

        let fingerprint = KeyFingerprint::of(credential);
        let mut found = None;
        for lookup in &self.lookups {
            if let Some(record) = lookup.lookup(self.repo.as_ref(), credential).await? {
                debug!(key = %fingerprint, shape = lookup.shape().as_str(), "Credential recognized");
                found = Some(record);
                break;
            }
        }

        let Some(record) = found else {
            debug!(key = %fingerprint, "Credential not found in any layout");
            return Ok(KeyValidation::invalid(InvalidCredential::NotFound));
        };

        if !record.active {
            return Ok(KeyValidation::invalid(InvalidCredential::Inactive));
        }

        if let Some(tenant_id) = record.tenant_id {
            return Ok(KeyValidation::valid(tenant_id));
        }

        let Some(user_id) = record.owner_user_id else {
            return Ok(KeyValidation::invalid(InvalidCredential::NoTenant));
        };

        match self.repo.find_owner_tenant(&user_id).await? {
            Some(tenant_id) => {
                debug!(key = %fingerprint, user_id = %user_id, tenant_id = %tenant_id, "Resolved tenant through owning user");
                Ok(KeyValidation::valid(tenant_id))
            }
            None => Ok(KeyValidation::invalid(InvalidCredential::NoTenant)),
        }
    }
}

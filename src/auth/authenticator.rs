//! Single entry point for turning a credential into a tenant context.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::auth::context::{ContextResolver, TenantContext};
use crate::auth::error::{AuthError, InvalidCredential};
use crate::auth::repository::CredentialRepository;
use crate::auth::usage::UsageTracker;
use crate::auth::validator::{KeyValidation, KeyValidator};
use crate::types::KeyFingerprint;

/// Default time budget for one authentication.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

/// Result of [`Authenticator::authenticate`]. Every failure is represented here.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub success: bool,
    pub context: Option<TenantContext>,
    pub error: Option<AuthError>,
}

impl AuthOutcome {
    pub fn success(context: TenantContext) -> Self {
        Self {
            success: true,
            context: Some(context),
            error: None,
        }
    }

    pub fn failure(error: AuthError) -> Self {
        Self {
            success: false,
            context: None,
            error: Some(error),
        }
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<TenantContext, AuthError> {
        match (self.context, self.error) {
            (Some(context), None) => Ok(context),
            (_, Some(error)) => Err(error),
            (None, None) => Err(AuthError::Internal("empty authentication outcome".to_string())),
        }
    }
}

#[derive(Clone)]
pub struct Authenticator {
    validator: Arc<KeyValidator>,
    resolver: Arc<ContextResolver>,
    usage: UsageTracker,
    timeout: Duration,
    configured_key: Option<String>,
}

impl Authenticator {
    pub fn new(repo: Arc<dyn CredentialRepository>) -> Self {
        Self {
            validator: Arc::new(KeyValidator::new(repo.clone())),
            resolver: Arc::new(ContextResolver::new(repo.clone())),
            usage: UsageTracker::new(repo),
            timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
            configured_key: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Credential checked by [`Self::validate_configured_key`]. Empty counts as unset.
    pub fn with_configured_key(mut self, key: Option<String>) -> Self {
        self.configured_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn configured_key(&self) -> Option<&str> {
        self.configured_key.as_deref()
    }

    /// Validate `credential` and resolve its tenant context.
    ///
    /// The lookup chain runs on its own task under the configured timeout, so
    /// a stalled datastore or a panic surfaces as a failed outcome. On success
    /// the last-use update is dispatched and not awaited.
    pub async fn authenticate(&self, credential: &str) -> AuthOutcome {
        if credential.trim().is_empty() {
            return AuthOutcome::failure(InvalidCredential::Missing.into());
        }

        let fingerprint = KeyFingerprint::of(credential);
        let validator = self.validator.clone();
        let resolver = self.resolver.clone();
        let owned = credential.to_string();

        let mut chain = tokio::spawn(async move {
            let validation = validator.validate(&owned).await?;
            match (validation.valid, validation.tenant_id) {
                (true, Some(tenant_id)) => resolver.resolve(&tenant_id).await,
                _ => Err(AuthError::InvalidCredential(
                    validation.error.unwrap_or(InvalidCredential::NotFound),
                )),
            }
        });

        let result = match tokio::time::timeout(self.timeout, &mut chain).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AuthError::Internal(format!(
                "authentication task failed: {}",
                join_error
            ))),
            Err(_) => {
                chain.abort();
                Err(AuthError::DatastoreUnavailable(format!(
                    "authentication timed out after {}s",
                    self.timeout.as_secs_f32()
                )))
            }
        };

        match result {
            Ok(context) => {
                self.usage.record_use(credential);
                info!(key = %fingerprint, tenant_id = %context.id, "Authenticated credential");
                AuthOutcome::success(context)
            }
            Err(err) => {
                match &err {
                    AuthError::InvalidCredential(reason) => {
                        warn!(key = %fingerprint, reason = %reason, "Rejected credential");
                    }
                    AuthError::DatastoreUnavailable(msg) => {
                        warn!(key = %fingerprint, error = %msg, "Authentication could not reach the datastore");
                    }
                    other => {
                        error!(key = %fingerprint, error = %other, "Authentication failed");
                    }
                }
                AuthOutcome::failure(err)
            }
        }
    }

    /// Validate a credential without resolving its context.
    ///
    /// `None` or an empty credential is a configuration problem, not an
    /// invalid credential.
    pub async fn validate_key(&self, credential: Option<&str>) -> Result<KeyValidation, AuthError> {
        let Some(credential) = credential.filter(|c| !c.trim().is_empty()) else {
            return Err(AuthError::ConfigurationMissing(
                "no API key configured".to_string(),
            ));
        };

        self.bounded("validation", self.validator.validate(credential))
            .await
    }

    pub async fn validate_configured_key(&self) -> Result<KeyValidation, AuthError> {
        self.validate_key(self.configured_key.as_deref()).await
    }

    /// The first connected tenant, under the configured timeout.
    pub async fn first_context(&self) -> Result<Option<TenantContext>, AuthError> {
        self.bounded("advertiser lookup", self.resolver.first_context())
            .await
    }

    /// All tenants sorted by display name, under the configured timeout.
    pub async fn list_contexts(&self) -> Result<Vec<TenantContext>, AuthError> {
        self.bounded("advertiser listing", self.resolver.list_contexts())
            .await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            AuthError::DatastoreUnavailable(format!(
                "{} timed out after {}s",
                what,
                self.timeout.as_secs_f32()
            ))
        })?
    }
}

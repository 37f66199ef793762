//! Credential validation and tenant context resolution.
//!
//! An opaque API key is turned into the advertiser account it grants access
//! to. The pieces, leaf first:
//!
//! - [`CredentialRepository`]: the only datastore access, isolating the two
//!   historical `api_keys` layouts
//! - [`KeyValidator`]: ordered lookup chain over those layouts
//! - [`ContextResolver`]: tenant row to normalized [`TenantContext`]
//! - [`UsageTracker`]: detached, best-effort last-use stamp
//! - [`Authenticator`]: the single `authenticate` entry point used by the
//!   transport layer
//!
//! ## Usage
//!
//! ```ignore
//! let repo: Arc<dyn CredentialRepository> = Arc::new(SurrealCredentialRepository::new(db));
//! let auth = Authenticator::new(repo).with_configured_key(settings.api_key.clone());
//!
//! let outcome = auth.authenticate(&api_key).await;
//! if let Some(context) = outcome.context {
//!     tracing::info!(tenant_id = %context.id, "session authenticated");
//! }
//! ```

mod authenticator;
mod context;
mod error;
pub mod repository;
mod usage;
mod validator;


pub use authenticator::{AuthOutcome, Authenticator, DEFAULT_AUTH_TIMEOUT_SECS};
pub use context::{ContextResolver, TenantContext, TenantMetadata};
pub use error::{AuthError, INVALID_CREDENTIAL_ERROR_CODE, InvalidCredential};
pub use repository::{
    CredentialRepository, RepoFuture, RepositoryError, SurrealCredentialRepository, UsageOutcome,
};
pub use usage::UsageTracker;
pub use validator::{CredentialRecord, KeyLookup, KeyValidation, KeyValidator, LegacyKeyLookup, PrimaryKeyLookup};

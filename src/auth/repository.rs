//! Credential and advertiser storage.
//!
//! `CredentialRepository` is the only seam through which the authentication
//! components touch the datastore. Implementations exist for SurrealDB
//! (`SurrealCredentialRepository`) and Supabase PostgREST
//! (`crate::db::SupabaseRepository`).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::db::{AdvertiserRow, Db, KeyShape, LegacyKeyRecord, PrimaryKeyRecord, QueryBuilder};
use crate::types::{KeyFingerprint, TenantId, UserId};

/// Boxed future returned by repository operations.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Datastore failures. "Not found" is never an error; it is `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The datastore could not be reached or failed to answer.
    Unavailable(String),
    /// The datastore did not answer in time.
    Timeout,
    /// The datastore refused the request (bad credentials, bad query).
    Rejected { status: u16, message: String },
    /// The datastore answered with something that could not be decoded.
    Decode(String),
}

impl RepositoryError {
    /// Whether a retry later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "Datastore unavailable: {}", msg),
            Self::Timeout => write!(f, "Datastore request timed out"),
            Self::Rejected { status, message } => {
                write!(f, "Datastore rejected request ({}): {}", status, message)
            }
            Self::Decode(msg) => write!(f, "Unexpected datastore response: {}", msg),
        }
    }
}

impl std::error::Error for RepositoryError {}

impl From<surrealdb::Error> for RepositoryError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Result of a best-effort usage update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageOutcome {
    /// The timestamp was written through this layout.
    Recorded(KeyShape),
    /// Neither layout accepted the update.
    NotRecorded(String),
}

/// Lookups and updates against the credential and advertiser tables.
pub trait CredentialRepository: Send + Sync {
    /// Find a credential through the primary (`key`) layout.
    fn find_by_primary_key<'a>(&'a self, credential: &'a str)
    -> RepoFuture<'a, Option<PrimaryKeyRecord>>;

    /// Find a credential through the legacy (`key_value`) layout, active rows first.
    fn find_by_legacy_key<'a>(&'a self, credential: &'a str)
    -> RepoFuture<'a, Option<LegacyKeyRecord>>;

    /// First advertiser owned by `user_id`, ordered by connection time then id.
    fn find_owner_tenant<'a>(&'a self, user_id: &'a UserId) -> RepoFuture<'a, Option<TenantId>>;

    /// Stamp the primary-layout last-use column. Returns whether a row matched.
    fn touch_primary_key<'a>(&'a self, credential: &'a str) -> RepoFuture<'a, bool>;

    /// Stamp the legacy-layout last-use column. Returns whether a row matched.
    fn touch_legacy_key<'a>(&'a self, credential: &'a str) -> RepoFuture<'a, bool>;

    fn find_advertiser<'a>(&'a self, id: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>>;

    /// The advertiser connected first (diagnostics).
    fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>>;

    fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>>;

    /// Record a use of `credential`: primary layout first, legacy layout when
    /// that fails or matches nothing. A failing fallback is reported, not raised.
    fn update_usage<'a>(
        &'a self,
        credential: &'a str,
    ) -> Pin<Box<dyn Future<Output = UsageOutcome> + Send + 'a>> {
        Box::pin(async move {
            let fingerprint = KeyFingerprint::of(credential);

            match self.touch_primary_key(credential).await {
                Ok(true) => return UsageOutcome::Recorded(KeyShape::Primary),
                Ok(false) => {
                    debug!(key = %fingerprint, "No primary-layout row to stamp, trying legacy layout");
                }
                Err(e) => {
                    debug!(key = %fingerprint, error = %e, "Primary-layout usage update failed, trying legacy layout");
                }
            }

            match self.touch_legacy_key(credential).await {
                Ok(true) => UsageOutcome::Recorded(KeyShape::Legacy),
                Ok(false) => UsageOutcome::NotRecorded("no matching credential row".to_string()),
                Err(e) => UsageOutcome::NotRecorded(e.to_string()),
            }
        })
    }
}

/// SurrealDB-backed repository.
pub struct SurrealCredentialRepository {
    db: Db,
}

impl SurrealCredentialRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}

impl CredentialRepository for SurrealCredentialRepository {
    fn find_by_primary_key<'a>(
        &'a self,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
        Box::pin(async move { Ok(QueryBuilder::find_primary_key(&self.db, credential).await?) })
    }

    fn find_by_legacy_key<'a>(
        &'a self,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
        Box::pin(async move { Ok(QueryBuilder::find_legacy_key(&self.db, credential).await?) })
    }

    fn find_owner_tenant<'a>(&'a self, user_id: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
        Box::pin(async move { Ok(QueryBuilder::find_owner_advertiser(&self.db, user_id).await?) })
    }

    fn touch_primary_key<'a>(&'a self, credential: &'a str) -> RepoFuture<'a, bool> {
        Box::pin(async move { Ok(QueryBuilder::touch_primary_key(&self.db, credential).await? > 0) })
    }

    fn touch_legacy_key<'a>(&'a self, credential: &'a str) -> RepoFuture<'a, bool> {
        Box::pin(async move { Ok(QueryBuilder::touch_legacy_key(&self.db, credential).await? > 0) })
    }

    fn find_advertiser<'a>(&'a self, id: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
        Box::pin(async move { Ok(QueryBuilder::find_advertiser(&self.db, id).await?) })
    }

    fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
        Box::pin(async move { Ok(QueryBuilder::first_advertiser(&self.db).await?) })
    }

    fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
        Box::pin(async move { Ok(QueryBuilder::list_advertisers(&self.db).await?) })
    }
}

/// Repository doubles for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every call as if the datastore were down, counting calls.
    #[derive(Default)]
    pub struct UnavailableRepository {
        pub calls: AtomicUsize,
    }

    impl UnavailableRepository {
        fn fail<'a, T: Send + 'a>(&'a self) -> RepoFuture<'a, T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(RepositoryError::Unavailable("connection refused".to_string())) })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CredentialRepository for UnavailableRepository {
        fn find_by_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
            self.fail()
        }
        fn find_by_legacy_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
            self.fail()
        }
        fn find_owner_tenant<'a>(&'a self, _: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
            self.fail()
        }
        fn touch_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            self.fail()
        }
        fn touch_legacy_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            self.fail()
        }
        fn find_advertiser<'a>(&'a self, _: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
            self.fail()
        }
        fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
            self.fail()
        }
        fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
            self.fail()
        }
    }

    /// Wraps another repository and counts every call that reaches it.
    pub struct CountingRepository {
        inner: Arc<dyn CredentialRepository>,
        calls: AtomicUsize,
    }

    impl CountingRepository {
        pub fn new(inner: Arc<dyn CredentialRepository>) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CredentialRepository for CountingRepository {
        fn find_by_primary_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
            self.hit();
            self.inner.find_by_primary_key(c)
        }
        fn find_by_legacy_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
            self.hit();
            self.inner.find_by_legacy_key(c)
        }
        fn find_owner_tenant<'a>(&'a self, u: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
            self.hit();
            self.inner.find_owner_tenant(u)
        }
        fn touch_primary_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, bool> {
            self.hit();
            self.inner.touch_primary_key(c)
        }
        fn touch_legacy_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, bool> {
            self.hit();
            self.inner.touch_legacy_key(c)
        }
        fn find_advertiser<'a>(&'a self, id: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
            self.hit();
            self.inner.find_advertiser(id)
        }
        fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
            self.hit();
            self.inner.first_advertiser()
        }
        fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
            self.hit();
            self.inner.list_advertisers()
        }
    }

    /// Never answers key lookups within any reasonable time.
    pub struct StalledRepository;

    impl StalledRepository {
        fn stall<'a, T: Send + 'a>(&'a self) -> RepoFuture<'a, T> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(RepositoryError::Timeout)
            })
        }
    }

    impl CredentialRepository for StalledRepository {
        fn find_by_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
            self.stall()
        }
        fn find_by_legacy_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
            self.stall()
        }
        fn find_owner_tenant<'a>(&'a self, _: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
            self.stall()
        }
        fn touch_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            self.stall()
        }
        fn touch_legacy_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            self.stall()
        }
        fn find_advertiser<'a>(&'a self, _: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
            self.stall()
        }
        fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
            self.stall()
        }
        fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
            self.stall()
        }
    }

    /// Answers the key lookup with a record, then panics resolving the tenant.
    pub struct PanickingRepository;

    fn corrupt_row() -> RepositoryError {
        panic!("corrupt advertiser row")
    }

    impl CredentialRepository for PanickingRepository {
        fn find_by_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
            Box::pin(async {
                Ok(Some(PrimaryKeyRecord {
                    advertiser_id: Some(TenantId::new("T1")),
                    active: Some(true),
                }))
            })
        }
        fn find_by_legacy_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
            Box::pin(async { Ok(None) })
        }
        fn find_owner_tenant<'a>(&'a self, _: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
            Box::pin(async { Ok(None) })
        }
        fn touch_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            Box::pin(async { Ok(false) })
        }
        fn touch_legacy_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            Box::pin(async { Ok(false) })
        }
        fn find_advertiser<'a>(&'a self, _: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
            Box::pin(async { Err(corrupt_row()) })
        }
        fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
            Box::pin(async { Ok(None) })
        }
        fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    /// Primary-layout updates always fail; legacy updates pass through.
    pub struct BrokenPrimaryUpdates {
        pub inner: Arc<dyn CredentialRepository>,
    }

    impl CredentialRepository for BrokenPrimaryUpdates {
        fn find_by_primary_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
            self.inner.find_by_primary_key(c)
        }
        fn find_by_legacy_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
            self.inner.find_by_legacy_key(c)
        }
        fn find_owner_tenant<'a>(&'a self, u: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
            self.inner.find_owner_tenant(u)
        }
        fn touch_primary_key<'a>(&'a self, _: &'a str) -> RepoFuture<'a, bool> {
            Box::pin(async {
                Err(RepositoryError::Rejected {
                    status: 400,
                    message: "column \"key\" does not exist".to_string(),
                })
            })
        }
        fn touch_legacy_key<'a>(&'a self, c: &'a str) -> RepoFuture<'a, bool> {
            self.inner.touch_legacy_key(c)
        }
        fn find_advertiser<'a>(&'a self, id: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
            self.inner.find_advertiser(id)
        }
        fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
            self.inner.first_advertiser()
        }
        fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
            self.inner.list_advertisers()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::{
        ApiKeyCreate, DatabaseConfig, LegacyApiKeyCreate, create_connection, ensure_schema,
    };
    use std::sync::Arc;

    async fn setup_test_repo() -> SurrealCredentialRepository {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        SurrealCredentialRepository::new(db)
    }

    async fn seed_keys(repo: &SurrealCredentialRepository) {
        QueryBuilder::create_api_key(
            repo.db(),
            &ApiKeyCreate {
                key: "abc".to_string(),
                advertiser_id: TenantId::new("T1"),
                active: true,
            },
        )
        .await
        .unwrap();
        QueryBuilder::create_legacy_api_key(
            repo.db(),
            &LegacyApiKeyCreate {
                key_value: "xyz".to_string(),
                user_id: Some(UserId::new("U1")),
                advertiser_id: None,
                is_active: true,
            },
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_repository_error_transience() {
        assert!(RepositoryError::Unavailable("down".into()).is_transient());
        assert!(RepositoryError::Timeout.is_transient());
        assert!(!RepositoryError::Decode("bad json".into()).is_transient());
        assert!(
            !RepositoryError::Rejected {
                status: 401,
                message: "bad key".into()
            }
            .is_transient()
        );
    }

    #[tokio::test]
    async fn test_update_usage_prefers_primary_layout() {
        let repo = setup_test_repo().await;
        seed_keys(&repo).await;

        assert_eq!(
            repo.update_usage("abc").await,
            UsageOutcome::Recorded(KeyShape::Primary)
        );
    }

    #[tokio::test]
    async fn test_update_usage_falls_back_to_legacy_layout() {
        let repo = setup_test_repo().await;
        seed_keys(&repo).await;

        assert_eq!(
            repo.update_usage("xyz").await,
            UsageOutcome::Recorded(KeyShape::Legacy)
        );
    }

    #[tokio::test]
    async fn test_update_usage_falls_back_when_primary_errors() {
        let repo = setup_test_repo().await;
        seed_keys(&repo).await;
        let broken = BrokenPrimaryUpdates {
            inner: Arc::new(repo),
        };

        assert_eq!(
            broken.update_usage("xyz").await,
            UsageOutcome::Recorded(KeyShape::Legacy)
        );
    }

    #[tokio::test]
    async fn test_update_usage_swallows_fallback_failure() {
        let repo = UnavailableRepository::default();

        let outcome = repo.update_usage("abc").await;
        assert!(matches!(outcome, UsageOutcome::NotRecorded(_)));
        // one primary attempt, one legacy attempt, no retries
        assert_eq!(repo.calls(), 2);
    }

    #[tokio::test]
    async fn test_update_usage_unknown_key_not_recorded() {
        let repo = setup_test_repo().await;
        seed_keys(&repo).await;

        assert!(matches!(
            repo.update_usage("missing").await,
            UsageOutcome::NotRecorded(_)
        ));
    }
}

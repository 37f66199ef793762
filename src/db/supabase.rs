//! Supabase (PostgREST) credential repository.
//!
//! Tables are reached through `{SUPABASE_URL}/rest/v1/{table}` with the
//! service key sent both as `apikey` and as a bearer token. A layout whose
//! columns do not exist in the deployed schema answers HTTP 400 with an
//! undefined-column code; that is reported as "no match" so the other layout
//! can be tried.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::auth::repository::{CredentialRepository, RepoFuture, RepositoryError};
use crate::db::schema::{AdvertiserRow, LegacyKeyRecord, PrimaryKeyRecord};
use crate::types::{TenantId, UserId};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Postgres "undefined_column" and PostgREST "column not in schema cache".
const UNDEFINED_COLUMN_CODES: &[&str] = &["42703", "PGRST204"];

/// Legacy-layout projections, widest first. Older tables have no
/// `advertiser_id` column; their keys resolve through `user_id`.
const LEGACY_KEY_SELECTS: &[&str] = &["advertiser_id,user_id,is_active", "user_id,is_active"];

const ADVERTISER_SELECT: &str =
    "advertiser_id:id,user_id,profile_id,account_name,marketplace,account_type,metadata";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Read `SUPABASE_URL` and `SUPABASE_KEY`. Returns `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let url = env::var("SUPABASE_URL").ok().filter(|v| !v.is_empty())?;
        let key = env::var("SUPABASE_KEY").ok().filter(|v| !v.is_empty())?;
        Some(Self::new(url, key))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwnedAdvertiser {
    advertiser_id: TenantId,
}

pub struct SupabaseRepository {
    client: Client,
    base: Url,
    service_key: String,
}

impl SupabaseRepository {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let base = Url::parse(&format!("{}/rest/v1/", config.url.trim_end_matches('/')))
            .with_context(|| format!("Invalid Supabase URL: {}", config.url))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base,
            service_key: config.service_key,
        })
    }

    fn table_url(&self, table: &str, params: &[(&str, String)]) -> Result<Url, RepositoryError> {
        let mut url = self
            .base
            .join(table)
            .map_err(|e| RepositoryError::Unavailable(format!("bad table url: {}", e)))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    /// Send a request. `Ok(None)` means the addressed columns do not exist.
    async fn send(&self, request: RequestBuilder) -> Result<Option<Response>, RepositoryError> {
        let response = request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(RepositoryError::Unavailable(format!("HTTP {}: {}", status, body)));
        }
        if status == StatusCode::BAD_REQUEST && is_undefined_column(&body) {
            debug!(body = %body, "Column layout not present in schema");
            return Ok(None);
        }

        Err(RepositoryError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Option<Vec<T>>, RepositoryError> {
        let url = self.table_url(table, params)?;
        let Some(response) = self.send(self.client.get(url)).await? else {
            return Ok(None);
        };

        let rows = response
            .json::<Vec<T>>()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(Some(rows))
    }

    async fn select_first<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, RepositoryError> {
        Ok(self
            .select(table, params)
            .await?
            .and_then(|rows| rows.into_iter().next()))
    }

    /// PATCH matching rows and return how many were updated.
    async fn patch(
        &self,
        table: &str,
        params: &[(&str, String)],
        body: Value,
    ) -> Result<usize, RepositoryError> {
        let url = self.table_url(table, params)?;
        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&body);

        let Some(response) = self.send(request).await? else {
            return Ok(0);
        };

        let rows = response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(rows.len())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn classify_transport(err: reqwest::Error) -> RepositoryError {
    if err.is_timeout() {
        RepositoryError::Timeout
    } else {
        RepositoryError::Unavailable(err.to_string())
    }
}

fn is_undefined_column(body: &str) -> bool {
    serde_json::from_str::<PostgrestError>(body)
        .ok()
        .and_then(|e| e.code)
        .is_some_and(|code| UNDEFINED_COLUMN_CODES.contains(&code.as_str()))
}

impl CredentialRepository for SupabaseRepository {
    fn find_by_primary_key<'a>(
        &'a self,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<PrimaryKeyRecord>> {
        Box::pin(async move {
            self.select_first(
                "api_keys",
                &[
                    ("select", "advertiser_id,active".to_string()),
                    ("key", eq(credential)),
                    ("order", "active.desc.nullslast".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await
        })
    }

    fn find_by_legacy_key<'a>(
        &'a self,
        credential: &'a str,
    ) -> RepoFuture<'a, Option<LegacyKeyRecord>> {
        Box::pin(async move {
            for select in LEGACY_KEY_SELECTS {
                let rows: Option<Vec<LegacyKeyRecord>> = self
                    .select(
                        "api_keys",
                        &[
                            ("select", select.to_string()),
                            ("key_value", eq(credential)),
                            ("order", "is_active.desc.nullslast".to_string()),
                            ("limit", "1".to_string()),
                        ],
                    )
                    .await?;
                if let Some(rows) = rows {
                    return Ok(rows.into_iter().next());
                }
                debug!(select = *select, "Legacy projection not available, narrowing");
            }
            Ok(None)
        })
    }

    fn find_owner_tenant<'a>(&'a self, user_id: &'a UserId) -> RepoFuture<'a, Option<TenantId>> {
        Box::pin(async move {
            let row: Option<OwnedAdvertiser> = self
                .select_first(
                    "advertisers",
                    &[
                        ("select", "advertiser_id:id".to_string()),
                        ("user_id", eq(user_id.as_str())),
                        ("order", "connected_since.asc,id.asc".to_string()),
                        ("limit", "1".to_string()),
                    ],
                )
                .await?;
            Ok(row.map(|r| r.advertiser_id))
        })
    }

    fn touch_primary_key<'a>(&'a self, credential: &'a str) -> RepoFuture<'a, bool> {
        Box::pin(async move {
            let updated = self
                .patch(
                    "api_keys",
                    &[("key", eq(credential))],
                    json!({ "last_used_at": Utc::now().to_rfc3339() }),
                )
                .await?;
            Ok(updated > 0)
        })
    }

    fn touch_legacy_key<'a>(&'a self, credential: &'a str) -> RepoFuture<'a, bool> {
        Box::pin(async move {
            let updated = self
                .patch(
                    "api_keys",
                    &[("key_value", eq(credential))],
                    json!({ "last_used": Utc::now().to_rfc3339() }),
                )
                .await?;
            Ok(updated > 0)
        })
    }

    fn find_advertiser<'a>(&'a self, id: &'a TenantId) -> RepoFuture<'a, Option<AdvertiserRow>> {
        Box::pin(async move {
            self.select_first(
                "advertisers",
                &[
                    ("select", ADVERTISER_SELECT.to_string()),
                    ("id", eq(id.as_str())),
                    ("limit", "1".to_string()),
                ],
            )
            .await
        })
    }

    fn first_advertiser(&self) -> RepoFuture<'_, Option<AdvertiserRow>> {
        Box::pin(async move {
            self.select_first(
                "advertisers",
                &[
                    ("select", ADVERTISER_SELECT.to_string()),
                    ("order", "connected_since.asc,id.asc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await
        })
    }

    fn list_advertisers(&self) -> RepoFuture<'_, Vec<AdvertiserRow>> {
        Box::pin(async move {
            let rows = self
                .select(
                    "advertisers",
                    &[
                        ("select", ADVERTISER_SELECT.to_string()),
                        ("order", "account_name.asc".to_string()),
                    ],
                )
                .await?;
            Ok(rows.unwrap_or_default())
        })
    }
}

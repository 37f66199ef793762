// SurrealDB statements for the credential and advertiser tables.
//
// Lookups return `surrealdb::Result` so callers can classify failures; the
// admin helpers at the bottom are only used by the CLI and tests and return
// `anyhow::Result` like the rest of the application edge.

use crate::db::Db;
use crate::db::schema::*;
use crate::types::{TenantId, UserId};
use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use surrealdb::RecordId;

/// Columns projected from `advertisers`, with the record key flattened to a
/// plain string id.
const ADVERTISER_COLUMNS: &str = "meta::id(id) AS advertiser_id, user_id, profile_id, \
     account_name, marketplace, account_type, metadata, connected_since";

#[derive(Debug, Deserialize)]
struct OwnedAdvertiser {
    advertiser_id: TenantId,
}

#[derive(Debug, Deserialize)]
struct Touched {
    #[allow(dead_code)]
    id: RecordId,
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Look up a credential by the `key` column, active rows first.
    pub async fn find_primary_key(
        db: &Db,
        credential: &str,
    ) -> surrealdb::Result<Option<PrimaryKeyRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT advertiser_id, active FROM api_keys
                WHERE `key` = $credential
                ORDER BY active DESC
                LIMIT 1
                "#,
            )
            .bind(("credential", credential.to_string()))
            .await?;

        let rows: Vec<PrimaryKeyRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Look up a credential by the `key_value` column, active rows first.
    pub async fn find_legacy_key(
        db: &Db,
        credential: &str,
    ) -> surrealdb::Result<Option<LegacyKeyRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT advertiser_id, user_id, is_active FROM api_keys
                WHERE key_value = $credential
                ORDER BY is_active DESC
                LIMIT 1
                "#,
            )
            .bind(("credential", credential.to_string()))
            .await?;

        let rows: Vec<LegacyKeyRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// First advertiser owned by a user, oldest connection first.
    pub async fn find_owner_advertiser(
        db: &Db,
        user_id: &UserId,
    ) -> surrealdb::Result<Option<TenantId>> {
        let mut res = db
            .query(
                r#"
                SELECT meta::id(id) AS advertiser_id, connected_since FROM advertisers
                WHERE user_id = $user_id
                ORDER BY connected_since ASC, advertiser_id ASC
                LIMIT 1
                "#,
            )
            .bind(("user_id", user_id.as_str().to_string()))
            .await?;

        let rows: Vec<OwnedAdvertiser> = res.take(0)?;
        Ok(rows.into_iter().next().map(|row| row.advertiser_id))
    }

    /// Stamp `last_used_at` on primary-layout rows. Returns matched rows.
    pub async fn touch_primary_key(db: &Db, credential: &str) -> surrealdb::Result<usize> {
        let mut res = db
            .query(
                r#"
                UPDATE api_keys SET last_used_at = time::now()
                WHERE `key` = $credential
                RETURN id
                "#,
            )
            .bind(("credential", credential.to_string()))
            .await?;

        let touched: Vec<Touched> = res.take(0)?;
        Ok(touched.len())
    }

    /// Stamp `last_used` on legacy-layout rows. Returns matched rows.
    pub async fn touch_legacy_key(db: &Db, credential: &str) -> surrealdb::Result<usize> {
        let mut res = db
            .query(
                r#"
                UPDATE api_keys SET last_used = time::now()
                WHERE key_value = $credential
                RETURN id
                "#,
            )
            .bind(("credential", credential.to_string()))
            .await?;

        let touched: Vec<Touched> = res.take(0)?;
        Ok(touched.len())
    }

    pub async fn find_advertiser(
        db: &Db,
        advertiser_id: &TenantId,
    ) -> surrealdb::Result<Option<AdvertiserRow>> {
        let query = format!(
            "SELECT {} FROM type::thing('advertisers', $advertiser_id)",
            ADVERTISER_COLUMNS
        );
        let mut res = db
            .query(query)
            .bind(("advertiser_id", advertiser_id.as_str().to_string()))
            .await?;

        let rows: Vec<AdvertiserRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// The advertiser connected first.
    pub async fn first_advertiser(db: &Db) -> surrealdb::Result<Option<AdvertiserRow>> {
        let query = format!(
            "SELECT {} FROM advertisers ORDER BY connected_since ASC, advertiser_id ASC LIMIT 1",
            ADVERTISER_COLUMNS
        );
        let mut res = db.query(query).await?;

        let rows: Vec<AdvertiserRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_advertisers(db: &Db) -> surrealdb::Result<Vec<AdvertiserRow>> {
        let query = format!(
            "SELECT {} FROM advertisers ORDER BY account_name ASC",
            ADVERTISER_COLUMNS
        );
        let mut res = db.query(query).await?;

        let rows: Vec<AdvertiserRow> = res.take(0)?;
        Ok(rows)
    }

    pub async fn create_advertiser(db: &Db, data: &AdvertiserCreate) -> Result<TenantId> {
        let connected_since = data.connected_since.unwrap_or_else(Utc::now);

        db.query(
            r#"
            CREATE type::thing('advertisers', $advertiser_id) CONTENT {
                user_id: $user_id,
                profile_id: $profile_id,
                account_name: $account_name,
                marketplace: $marketplace,
                account_type: $account_type,
                connected_since: <datetime> $connected_since,
                metadata: $metadata
            }
            "#,
        )
        .bind(("advertiser_id", data.id.as_str().to_string()))
        .bind(("user_id", data.user_id.as_str().to_string()))
        .bind(("profile_id", data.profile_id.clone()))
        .bind(("account_name", data.account_name.clone()))
        .bind(("marketplace", data.marketplace.clone()))
        .bind(("account_type", data.account_type.clone()))
        .bind(("connected_since", connected_since.to_rfc3339()))
        .bind(("metadata", data.metadata.clone()))
        .await?
        .check()?;

        Ok(data.id.clone())
    }

    pub async fn create_api_key(db: &Db, data: &ApiKeyCreate) -> Result<()> {
        db.query(
            r#"
            CREATE api_keys CONTENT {
                "key": $key,
                advertiser_id: $advertiser_id,
                active: $active,
                created_at: time::now()
            }
            "#,
        )
        .bind(("key", data.key.clone()))
        .bind(("advertiser_id", data.advertiser_id.as_str().to_string()))
        .bind(("active", data.active))
        .await?
        .check()?;

        Ok(())
    }

    pub async fn create_legacy_api_key(db: &Db, data: &LegacyApiKeyCreate) -> Result<()> {
        db.query(
            r#"
            CREATE api_keys CONTENT {
                key_value: $key_value,
                user_id: $user_id,
                advertiser_id: $advertiser_id,
                is_active: $is_active,
                created_at: time::now()
            }
            "#,
        )
        .bind(("key_value", data.key_value.clone()))
        .bind(("user_id", data.user_id.as_ref().map(|u| u.as_str().to_string())))
        .bind((
            "advertiser_id",
            data.advertiser_id.as_ref().map(|a| a.as_str().to_string()),
        ))
        .bind(("is_active", data.is_active))
        .await?
        .check()?;

        Ok(())
    }

    /// Deactivate a key in whichever layout holds it. Returns whether a row changed.
    pub async fn deactivate_api_key(db: &Db, credential: &str) -> Result<bool> {
        let mut res = db
            .query(
                r#"
                UPDATE api_keys SET active = false WHERE `key` = $credential RETURN id;
                UPDATE api_keys SET is_active = false WHERE key_value = $credential RETURN id;
                "#,
            )
            .bind(("credential", credential.to_string()))
            .await?;

        let primary: Vec<Touched> = res.take(0)?;
        let legacy: Vec<Touched> = res.take(1)?;
        Ok(!primary.is_empty() || !legacy.is_empty())
    }

    pub async fn list_api_keys(db: &Db) -> Result<Vec<ApiKeySummary>> {
        let mut res = db
            .query(
                r#"
                SELECT id, advertiser_id, user_id, active, is_active,
                       (`key` != NONE) AS has_key, created_at
                FROM api_keys
                ORDER BY created_at ASC
                "#,
            )
            .await?;

        let keys: Vec<ApiKeySummary> = res.take(0)?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use chrono::TimeZone;
    use serde_json::json;

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    fn advertiser(id: &str, user: &str, name: &str, day: u32) -> AdvertiserCreate {
        AdvertiserCreate {
            id: TenantId::new(id),
            user_id: UserId::new(user),
            profile_id: format!("profile-{}", id),
            account_name: name.to_string(),
            marketplace: "US".to_string(),
            account_type: "seller".to_string(),
            connected_since: Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()),
            metadata: Some(json!({ "countryCode": "US" })),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_advertiser() {
        let db = setup_test_db().await;
        let id = QueryBuilder::create_advertiser(&db, &advertiser("T1", "U1", "Acme", 1))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "T1");

        let row = QueryBuilder::find_advertiser(&db, &TenantId::new("T1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.advertiser_id.as_str(), "T1");
        assert_eq!(row.user_id, Some(UserId::new("U1")));
        assert_eq!(row.account_name.as_deref(), Some("Acme"));
        assert_eq!(row.metadata, Some(json!({ "countryCode": "US" })));

        let missing = QueryBuilder::find_advertiser(&db, &TenantId::new("nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_owner_lookup_prefers_oldest_connection() {
        let db = setup_test_db().await;
        QueryBuilder::create_advertiser(&db, &advertiser("T9", "U1", "Later", 5))
            .await
            .unwrap();
        QueryBuilder::create_advertiser(&db, &advertiser("T5", "U1", "Earlier", 2))
            .await
            .unwrap();
        QueryBuilder::create_advertiser(&db, &advertiser("T1", "U2", "Other", 1))
            .await
            .unwrap();

        let owner = QueryBuilder::find_owner_advertiser(&db, &UserId::new("U1"))
            .await
            .unwrap();
        assert_eq!(owner, Some(TenantId::new("T5")));

        let none = QueryBuilder::find_owner_advertiser(&db, &UserId::new("U404"))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_key_layouts_do_not_cross_match() {
        let db = setup_test_db().await;
        QueryBuilder::create_api_key(
            &db,
            &ApiKeyCreate {
                key: "abc".to_string(),
                advertiser_id: TenantId::new("T1"),
                active: true,
            },
        )
        .await
        .unwrap();
        QueryBuilder::create_legacy_api_key(
            &db,
            &LegacyApiKeyCreate {
                key_value: "xyz".to_string(),
                user_id: Some(UserId::new("U1")),
                advertiser_id: None,
                is_active: true,
            },
        )
        .await
        .unwrap();

        assert!(QueryBuilder::find_primary_key(&db, "abc").await.unwrap().is_some());
        assert!(QueryBuilder::find_primary_key(&db, "xyz").await.unwrap().is_none());
        assert!(QueryBuilder::find_legacy_key(&db, "xyz").await.unwrap().is_some());
        assert!(QueryBuilder::find_legacy_key(&db, "abc").await.unwrap().is_none());

        assert_eq!(QueryBuilder::touch_primary_key(&db, "abc").await.unwrap(), 1);
        assert_eq!(QueryBuilder::touch_primary_key(&db, "xyz").await.unwrap(), 0);
        assert_eq!(QueryBuilder::touch_legacy_key(&db, "xyz").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_prefers_active_row() {
        let db = setup_test_db().await;
        for (tenant, active) in [("T1", false), ("T2", true)] {
            QueryBuilder::create_api_key(
                &db,
                &ApiKeyCreate {
                    key: "twice".to_string(),
                    advertiser_id: TenantId::new(tenant),
                    active,
                },
            )
            .await
            .unwrap();
        }

        let row = QueryBuilder::find_primary_key(&db, "twice")
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_active());
        assert_eq!(row.advertiser_id, Some(TenantId::new("T2")));
    }

    #[tokio::test]
    async fn test_deactivate_and_list_api_keys() {
        let db = setup_test_db().await;
        QueryBuilder::create_api_key(
            &db,
            &ApiKeyCreate {
                key: "abc".to_string(),
                advertiser_id: TenantId::new("T1"),
                active: true,
            },
        )
        .await
        .unwrap();

        assert!(QueryBuilder::deactivate_api_key(&db, "abc").await.unwrap());
        assert!(!QueryBuilder::deactivate_api_key(&db, "missing").await.unwrap());

        let keys = QueryBuilder::list_api_keys(&db).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].shape(), KeyShape::Primary);
        assert!(!keys[0].enabled());
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "adspirer".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "advertising".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Both historical key layouts live in the same table, so it stays
        // schemaless; only the columns shared by lookups are indexed.
        "DEFINE TABLE IF NOT EXISTS api_keys SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS api_keys_key ON TABLE api_keys COLUMNS `key`;
         DEFINE INDEX IF NOT EXISTS api_keys_key_value ON TABLE api_keys COLUMNS key_value;",

        "DEFINE TABLE IF NOT EXISTS advertisers SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE advertisers TYPE string;
         DEFINE FIELD IF NOT EXISTS profile_id ON TABLE advertisers TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS account_name ON TABLE advertisers TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS marketplace ON TABLE advertisers TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS account_type ON TABLE advertisers TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS connected_since ON TABLE advertisers TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS metadata ON TABLE advertisers TYPE option<object>;
         DEFINE INDEX IF NOT EXISTS advertisers_user_id ON TABLE advertisers COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}

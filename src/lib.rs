// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod server;
pub mod tools;
pub mod types;

// Re-export key types and functions
pub use auth::{AuthError, AuthOutcome, Authenticator, CredentialRepository, TenantContext};
pub use config::ServerSettings;
pub use db::{DatabaseConfig, SupabaseConfig, create_connection, ensure_schema};
pub use server::McpServer;
pub use tools::{ToolHandler, ToolRegistry};

use std::sync::Arc;
use anyhow::Result;

use auth::SurrealCredentialRepository;
use db::SupabaseRepository;

/// Where advertiser accounts and API keys live.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Supabase PostgREST.
    Supabase(SupabaseConfig),
    /// SurrealDB (`memory`, `rocksdb://`, `ws://` ...).
    Surreal(DatabaseConfig),
}

/// Connect to the selected backend. SurrealDB gets its schema ensured.
pub async fn connect_repository(backend: Backend) -> Result<Arc<dyn CredentialRepository>> {
    match backend {
        Backend::Supabase(config) => {
            tracing::info!(url = %config.url, "Using Supabase backend");
            Ok(Arc::new(SupabaseRepository::new(config)?))
        }
        Backend::Surreal(config) => {
            tracing::info!(url = %config.url, "Using SurrealDB backend");
            let db = create_connection(config).await?;
            ensure_schema(&db).await?;
            Ok(Arc::new(SurrealCredentialRepository::new(db)))
        }
    }
}

/// Authenticator wired with the settings' timeout and configured key.
pub fn create_authenticator(
    repo: Arc<dyn CredentialRepository>,
    settings: &ServerSettings,
) -> Arc<Authenticator> {
    Arc::new(
        Authenticator::new(repo)
            .with_timeout(settings.auth_timeout)
            .with_configured_key(settings.api_key.clone()),
    )
}

/// Convenience function to create a stdio MCP server with every tool registered.
pub fn create_server(settings: Arc<ServerSettings>, authenticator: Arc<Authenticator>) -> McpServer {
    let tool_registry = Arc::new(tools::default_registry(&settings, authenticator));
    McpServer::new(settings, tool_registry)
}

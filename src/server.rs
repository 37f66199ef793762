//! MCP server implementation using rmcp.
//!
//! The same `McpServer` serves stdio (one trusted local client, no session
//! auth) and Streamable HTTP, where every session presents an API key at
//! `initialize` and is bound to the advertiser it resolves to.

use std::sync::Arc;
use tokio::sync::RwLock;

use anyhow::Result;
use axum::{Json, Router, http::StatusCode, routing::get};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::auth::{Authenticator, TenantContext};
use crate::config::ServerSettings;
use crate::tools::{ToolContext, ToolRegistry};

/// Type alias for HTTP request parts stored in rmcp extensions.
type HttpParts = http::request::Parts;

const INSTRUCTIONS: &str = "Amazon Advertising tools. Each session is bound to one advertiser \
    account; use getAdvertiserInfo to see which one and listAdvertiserAccounts to see all.";

/// MCP server that handles protocol requests and delegates to tool handlers.
#[derive(Clone)]
pub struct McpServer {
    settings: Arc<ServerSettings>,
    tool_registry: Arc<ToolRegistry>,
    /// Tenant this session authenticated as. Stays `None` over stdio.
    session: Arc<RwLock<Option<TenantContext>>>,
    /// Set in HTTP mode; `initialize` then requires a valid credential.
    session_auth: Option<Arc<Authenticator>>,
}

impl McpServer {
    /// Create a server without session authentication (stdio mode).
    pub fn new(settings: Arc<ServerSettings>, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            settings,
            tool_registry,
            session: Arc::new(RwLock::new(None)),
            session_auth: None,
        }
    }

    /// Create a server that authenticates each session from its HTTP headers.
    pub fn new_with_auth(
        settings: Arc<ServerSettings>,
        tool_registry: Arc<ToolRegistry>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self {
            session_auth: Some(authenticator),
            ..Self::new(settings, tool_registry)
        }
    }

    /// Get a clone of the session's tenant context.
    pub async fn session(&self) -> Option<TenantContext> {
        self.session.read().await.clone()
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    /// Authenticate the session from the initialize request's HTTP parts.
    ///
    /// No-op when session auth is off. Invalid credentials reject with
    /// `-32001`; datastore and internal failures reject as internal errors.
    async fn authenticate_session(&self, parts: Option<&HttpParts>) -> Result<(), McpError> {
        let Some(authenticator) = &self.session_auth else {
            return Ok(());
        };

        let credential = parts
            .and_then(|p| credential_from_headers(&p.headers))
            .unwrap_or_default();

        match authenticator.authenticate(&credential).await.into_result() {
            Ok(context) => {
                tracing::info!(
                    tenant_id = %context.id,
                    account = context.sort_name(),
                    "MCP session authenticated"
                );
                *self.session.write().await = Some(context);
                Ok(())
            }
            Err(e) => {
                if e.is_user_facing() {
                    tracing::warn!(reason = %e, "MCP session rejected");
                } else {
                    tracing::error!(error = %e, "MCP session authentication failed");
                }
                Err(e.to_mcp_error())
            }
        }
    }
}

/// Credential from `X-API-Key`, falling back to `Authorization: Bearer`.
fn credential_from_headers(headers: &http::HeaderMap) -> Option<String> {
    let api_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let bearer = || {
        headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    api_key.or_else(bearer).map(|s| s.to_string())
}

impl ServerHandler for McpServer {
    fn ping(
        &self,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), McpError>> + Send + '_ {
        std::future::ready(Ok(()))
    }

    fn initialize(
        &self,
        _request: InitializeRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<InitializeResult, McpError>> + Send + '_ {
        // rmcp stores http::request::Parts in extensions for HTTP transport
        let extensions = context.extensions.clone();
        let info = self.get_info();

        async move {
            self.authenticate_session(extensions.get::<HttpParts>())
                .await?;
            Ok(info)
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let result = ListToolsResult {
            tools: self.tool_registry.list_tools(),
            next_cursor: None,
            ..Default::default()
        };
        std::future::ready(Ok(result))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();
        let registry = self.tool_registry.clone();
        let session = self.session.clone();

        async move {
            if !registry.contains(&tool_name) {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {}", tool_name),
                    None,
                ));
            }

            let ctx = ToolContext {
                session: session.read().await.clone(),
            };

            registry
                .call_tool(&tool_name, args, &ctx)
                .await
                .map_err(|e| McpError::internal_error(format!("Tool execution failed: {}", e), None))
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.settings.name.clone(),
                version: self.settings.version.clone(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Serve MCP Streamable HTTP at `/mcp` on `bind` (e.g. `0.0.0.0:3942`).
///
/// Each session gets its own `McpServer` and must authenticate at
/// `initialize`. `/health` answers without auth.
pub async fn start_mcp_http(
    settings: Arc<ServerSettings>,
    tool_registry: Arc<ToolRegistry>,
    authenticator: Arc<Authenticator>,
    bind: &str,
) -> Result<()> {
    let service = StreamableHttpService::new(
        move || {
            Ok(McpServer::new_with_auth(
                settings.clone(),
                tool_registry.clone(),
                authenticator.clone(),
            ))
        },
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = Router::new()
        .route("/health", get(health_check))
        .nest_service("/mcp", service)
        .layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!("MCP HTTP server listening on http://{}", bind);

    axum::serve(listener, router).await?;

    Ok(())
}

//! Tool registry for managing MCP tool handlers.
//!
//! Provides a `ToolHandler` trait for implementing tools and a `ToolRegistry`
//! for registering and invoking them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool as McpTool};
use serde_json::json;

use crate::auth::TenantContext;

/// Context passed to tool handlers during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Tenant the session authenticated as (HTTP mode). `None` over stdio.
    pub session: Option<TenantContext>,
}

/// Trait for handling MCP tool invocations.
///
/// Each tool implements this trait to define its schema and execution logic.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's name (e.g., "getAdvertiserInfo").
    fn name(&self) -> &str;

    /// Returns the tool's human-readable title.
    fn title(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str;

    /// Returns the input schema for this tool. Defaults to no arguments.
    fn input_schema(&self) -> JsonObject {
        empty_object_schema()
    }

    /// Executes the tool with the given arguments.
    ///
    /// Expected failures are returned as `is_error` results; `Err` is for
    /// failures the server should report as protocol errors.
    fn execute(
        &self,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send + '_>>;

    /// Converts this handler to an `McpTool` for use in `list_tools`.
    fn to_mcp_tool(&self) -> McpTool {
        use std::borrow::Cow;

        McpTool {
            name: Cow::Owned(self.name().to_string()),
            title: self.title().map(|s| s.to_string()),
            description: Some(Cow::Owned(self.description().to_string())),
            input_schema: Arc::new(self.input_schema()),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }
}

/// `{"type": "object", "properties": {}}`
pub fn empty_object_schema() -> JsonObject {
    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), json!({}));
    schema
}

/// Successful single-text result.
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: Some(false),
        meta: None,
    }
}

/// Failed single-text result.
pub fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

/// Registry for managing tool handlers.
#[derive(Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a tool handler.
    pub fn register(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(handler.name().to_string(), handler);
        self
    }

    /// Register a tool handler from a type that implements `ToolHandler`.
    pub fn register_handler<T: ToolHandler + 'static>(mut self, handler: T) -> Self {
        self.handlers.insert(handler.name().to_string(), Arc::new(handler));
        self
    }

    /// Get a tool handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// List all registered tool names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get all registered tools as `McpTool` instances for `list_tools`, sorted by name.
    pub fn list_tools(&self) -> Vec<McpTool> {
        let mut tools: Vec<McpTool> = self
            .handlers
            .values()
            .map(|handler| handler.to_mcp_tool())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool by name with the given arguments.
    pub async fn call_tool(
        &self,
        name: &str,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Result<CallToolResult> {
        let handler = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", name))?;

        tracing::debug!(
            tool = name,
            tenant_id = ctx.session.as_ref().map(|s| s.id.as_str()),
            "Calling tool"
        );
        handler.execute(args, ctx).await
    }

    /// Check if a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Return the number of registered tools.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Return `true` if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl ToolHandler for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "fixed reply"
        }

        fn execute(
            &self,
            _args: JsonObject,
            _ctx: &ToolContext,
        ) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send + '_>> {
            let name = self.0;
            Box::pin(async move { Ok(text_result(name)) })
        }
    }

    #[test]
    fn test_list_tools_sorted() {
        let registry = ToolRegistry::new()
            .register_handler(Fixed("ping"))
            .register_handler(Fixed("echo"))
            .register(Arc::new(Fixed("listAdvertiserAccounts")));

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.list_names(),
            vec!["echo", "listAdvertiserAccounts", "ping"]
        );

        let tools = registry.list_tools();
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let registry = ToolRegistry::new().register_handler(Fixed("ping"));
        let ctx = ToolContext::default();

        let ok = registry.call_tool("ping", JsonObject::new(), &ctx).await.unwrap();
        assert_eq!(ok.is_error, Some(false));

        let err = registry
            .call_tool("missing", JsonObject::new(), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Tool not found"));
    }
}

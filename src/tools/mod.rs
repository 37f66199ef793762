//! Tool handler registry for managing MCP tool implementations.
//!
//! This module provides a simple way to register and invoke tool handlers,
//! making it easy to add new tools without modifying the core `ServerHandler`
//! implementation.

mod registry;

pub use registry::{
    ToolContext, ToolHandler, ToolRegistry, empty_object_schema, error_result, text_result,
};

// Tool handler implementations
mod advertiser_info;
mod echo;
mod list_accounts;
mod ping;
mod validate_api_key;

pub use advertiser_info::AdvertiserInfoHandler;
pub use echo::EchoHandler;
pub use list_accounts::{ListAccountsHandler, NO_ACCOUNTS_MESSAGE};
pub use ping::PingHandler;
pub use validate_api_key::ValidateApiKeyHandler;

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::config::ServerSettings;

/// Registry with every tool this server exposes.
pub fn default_registry(settings: &ServerSettings, authenticator: Arc<Authenticator>) -> ToolRegistry {
    ToolRegistry::new()
        .register_handler(PingHandler::new(settings))
        .register_handler(EchoHandler)
        .register_handler(ValidateApiKeyHandler::new(authenticator.clone()))
        .register_handler(AdvertiserInfoHandler::new(authenticator.clone()))
        .register_handler(ListAccountsHandler::new(authenticator))
}

/// Text of the first content item of a tool result.
#[cfg(test)]
pub(crate) fn first_text(result: &rmcp::model::CallToolResult) -> String {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    content["text"].as_str().unwrap().to_string()
}

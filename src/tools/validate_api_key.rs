//! Handler for the `validateApiKey` tool.
//!
//! Validates the credential configured for this process (`API_KEY`), not one
//! passed by the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject};

use crate::auth::{AuthError, Authenticator};
use crate::tools::{ToolContext, ToolHandler, error_result, text_result};

pub struct ValidateApiKeyHandler {
    authenticator: Arc<Authenticator>,
}

impl ValidateApiKeyHandler {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl ToolHandler for ValidateApiKeyHandler {
    fn name(&self) -> &str {
        "validateApiKey"
    }

    fn description(&self) -> &str {
        "Check whether the configured API key is valid and which advertiser it belongs to."
    }

    fn execute(
        &self,
        _args: JsonObject,
        _ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            let result = match self.authenticator.validate_configured_key().await {
                Ok(validation) => match (validation.valid, validation.tenant_id) {
                    (true, Some(tenant_id)) => {
                        tracing::debug!(tenant_id = %tenant_id, "Configured API key is valid");
                        text_result(format!("API key is valid for advertiser ID: {}", tenant_id))
                    }
                    _ => {
                        let reason = validation
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "Unknown error".to_string());
                        tracing::debug!(reason = %reason, "Configured API key is invalid");
                        error_result(format!("API key validation failed: {}", reason))
                    }
                },
                Err(AuthError::ConfigurationMissing(_)) => {
                    error_result("Error: No API_KEY provided in environment variables.")
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not validate configured API key");
                    error_result(format!(
                        "Error validating API key: {}. This could be due to missing database credentials.",
                        e
                    ))
                }
            };
            Ok(result)
        })
    }
}

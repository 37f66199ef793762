//! Handler for the `listAdvertiserAccounts` tool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject};
use serde_json::json;

use crate::auth::Authenticator;
use crate::tools::{ToolContext, ToolHandler, error_result, text_result};

pub const NO_ACCOUNTS_MESSAGE: &str = "No advertiser accounts were found in the database";

pub struct ListAccountsHandler {
    authenticator: Arc<Authenticator>,
}

impl ListAccountsHandler {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl ToolHandler for ListAccountsHandler {
    fn name(&self) -> &str {
        "listAdvertiserAccounts"
    }

    fn description(&self) -> &str {
        "List all connected advertiser accounts, sorted by account name."
    }

    fn execute(
        &self,
        _args: JsonObject,
        _ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            let contexts = match self.authenticator.list_contexts().await {
                Ok(contexts) => contexts,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list advertisers");
                    return Ok(error_result(format!("Error: {}", e)));
                }
            };

            // An empty table is a normal answer, not a failure.
            if contexts.is_empty() {
                return Ok(text_result(NO_ACCOUNTS_MESSAGE));
            }

            let accounts: Vec<_> = contexts
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "accountName": c.account_name,
                        "marketplace": c.marketplace,
                        "accountType": c.account_type,
                        "countryCode": c.metadata.country_code,
                        "currencyCode": c.metadata.currency_code,
                    })
                })
                .collect();

            tracing::debug!(count = accounts.len(), "Listing advertisers");
            Ok(text_result(serde_json::to_string_pretty(&accounts)?))
        })
    }
}

//! Handler for the `getAdvertiserInfo` tool.
//!
//! Reports the tenant the session authenticated as, or the first connected
//! advertiser when the session carries none (stdio diagnostics).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject};
use serde_json::json;

use crate::auth::{Authenticator, TenantContext};
use crate::tools::{ToolContext, ToolHandler, error_result, text_result};

pub struct AdvertiserInfoHandler {
    authenticator: Arc<Authenticator>,
}

impl AdvertiserInfoHandler {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

fn advertiser_info(context: &TenantContext) -> serde_json::Value {
    json!({
        "id": context.id,
        "name": context.account_name,
        "marketplace": context.marketplace,
        "accountType": context.account_type,
        "profileId": context.profile_id,
        "countryCode": context.metadata.country_code,
        "currencyCode": context.metadata.currency_code,
    })
}

impl ToolHandler for AdvertiserInfoHandler {
    fn name(&self) -> &str {
        "getAdvertiserInfo"
    }

    fn description(&self) -> &str {
        "Get account details (name, marketplace, profile, country and currency) of the advertiser."
    }

    fn execute(
        &self,
        _args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        let session = ctx.session.clone();

        Box::pin(async move {
            let context = match session {
                Some(context) => context,
                None => match self.authenticator.first_context().await {
                    Ok(Some(context)) => context,
                    Ok(None) => return Ok(error_result("Error: No advertiser accounts found")),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to load advertiser");
                        return Ok(error_result(format!("Error: {}", e)));
                    }
                },
            };

            tracing::debug!(tenant_id = %context.id, "Returning advertiser info");
            let text = serde_json::to_string_pretty(&advertiser_info(&context))?;
            Ok(text_result(text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repository::testing::StalledRepository;
    use crate::tools::first_text;
    use crate::tools::testing::{empty_authenticator, seeded_authenticator};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_advertiser_as_json() {
        let handler = AdvertiserInfoHandler::new(Arc::new(seeded_authenticator().await));

        let result = handler
            .execute(JsonObject::new(), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));

        let info: serde_json::Value = serde_json::from_str(&first_text(&result)).unwrap();
        assert_eq!(
            info,
            json!({
                "id": "T1",
                "name": "Acme",
                "marketplace": "US",
                "accountType": "seller",
                "profileId": "profile-T1",
                "countryCode": "US",
                "currencyCode": "USD"
            })
        );
    }

    #[tokio::test]
    async fn test_session_tenant_wins() {
        let auth = seeded_authenticator().await;
        let session = auth.authenticate("xyz").await.into_result().unwrap();
        let handler = AdvertiserInfoHandler::new(Arc::new(auth));

        let ctx = ToolContext {
            session: Some(session),
        };
        let result = handler.execute(JsonObject::new(), &ctx).await.unwrap();
        let info: serde_json::Value = serde_json::from_str(&first_text(&result)).unwrap();
        assert_eq!(info["id"], "T2");
        assert_eq!(info["countryCode"], "DE");
    }

    #[tokio::test]
    async fn test_no_advertisers() {
        let handler = AdvertiserInfoHandler::new(Arc::new(empty_authenticator().await));

        let result = handler
            .execute(JsonObject::new(), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(first_text(&result), "Error: No advertiser accounts found");
    }

    #[tokio::test]
    async fn test_stalled_datastore_is_error_result() {
        let auth = Authenticator::new(Arc::new(StalledRepository))
            .with_timeout(Duration::from_millis(50));
        let handler = AdvertiserInfoHandler::new(Arc::new(auth));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            handler.execute(JsonObject::new(), &ToolContext::default()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(first_text(&result).contains("timed out"));
    }
}

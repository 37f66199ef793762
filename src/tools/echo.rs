//! Handler for the `echo` tool.

use std::future::Future;
use std::pin::Pin;

use rmcp::model::{CallToolResult, JsonObject};
use serde_json::json;

use crate::tools::{ToolContext, ToolHandler, error_result, text_result};

pub struct EchoHandler;

impl ToolHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo a message back. Useful for testing argument passing."
    }

    fn input_schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert(
            "properties".to_string(),
            json!({
                "message": {
                    "type": "string",
                    "description": "Text to echo back."
                }
            }),
        );
        schema.insert("required".to_string(), json!(["message"]));
        schema
    }

    fn execute(
        &self,
        args: JsonObject,
        _ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            let Some(message) = args.get("message").and_then(|v| v.as_str()) else {
                return Ok(error_result("Missing required string argument: message"));
            };

            tracing::debug!(text = message, "Received echo request");
            Ok(text_result(format!("You said: {}", message)))
        })
    }
}

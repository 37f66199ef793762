//! Handler for the `ping` tool: liveness check that needs no datastore.

use std::future::Future;
use std::pin::Pin;

use chrono::{SecondsFormat, Utc};
use rmcp::model::{CallToolResult, JsonObject};

use crate::config::ServerSettings;
use crate::tools::{ToolContext, ToolHandler, text_result};

pub struct PingHandler {
    server_name: String,
    server_version: String,
}

impl PingHandler {
    pub fn new(settings: &ServerSettings) -> Self {
        Self {
            server_name: settings.name.clone(),
            server_version: settings.version.clone(),
        }
    }
}

impl ToolHandler for PingHandler {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Check that the server is running. Does not touch the database."
    }

    fn execute(
        &self,
        _args: JsonObject,
        _ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            tracing::debug!("Received ping request");
            Ok(text_result(format!(
                "Server is running correctly!\nTime: {}\nServer name: {}\nServer version: {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                self.server_name,
                self.server_version
            )))
        })
    }
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, env, fs, path::Path, path::PathBuf, time::Duration};

use crate::auth::DEFAULT_AUTH_TIMEOUT_SECS;

pub const SERVER_NAME: &str = "Amazon Advertising";

/// Key of this server's entry under `mcpServers` in the desktop config.
pub const DESKTOP_SERVER_ID: &str = "amazon-ads";

/// Process-wide server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub name: String,
    pub version: String,
    /// Credential checked by the `validateApiKey` tool.
    pub api_key: Option<String>,
    pub auth_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env::var("MCP_SERVER_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            auth_timeout: Duration::from_secs(
                env::var("AUTH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS),
            ),
        }
    }
}

/// Claude Desktop `config.json`. Unknown keys and other servers are kept as-is.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DesktopConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A stdio server entry in the desktop config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl McpServerEntry {
    /// Entry that launches `command start` with the given API key.
    pub fn stdio(command: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut env = BTreeMap::new();
        env.insert("API_KEY".to_string(), api_key.into());
        Self {
            command: command.into(),
            args: vec!["start".to_string()],
            env,
        }
    }
}

/// Location of the Claude Desktop config for this platform.
///
/// `CLAUDE_DESKTOP_CONFIG` overrides the platform default.
pub fn desktop_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var("CLAUDE_DESKTOP_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    let base = if cfg!(target_os = "windows") {
        env::var("APPDATA")
            .map(PathBuf::from)
            .context("APPDATA is not set")?
    } else if cfg!(target_os = "macos") {
        home_dir()?.join("Library").join("Application Support")
    } else {
        match env::var("XDG_CONFIG_HOME") {
            Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
            _ => home_dir()?.join(".config"),
        }
    };

    Ok(base.join("Claude").join("config.json"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    env::var("HOME")
        .map(PathBuf::from)
        .context("HOME is not set")
}

/// Read the desktop config. A missing or unreadable file yields an empty one.
pub fn load_desktop_config(path: &Path) -> DesktopConfig {
    let Ok(raw) = fs::read_to_string(path) else {
        return DesktopConfig::default();
    };

    match serde_json::from_str(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not parse desktop config, starting fresh");
            DesktopConfig::default()
        }
    }
}

/// Add or replace this server's entry, keeping everything else in the file.
pub fn install_server_entry(path: &Path, entry: &McpServerEntry) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut cfg = load_desktop_config(path);
    cfg.mcp_servers
        .insert(DESKTOP_SERVER_ID.to_string(), serde_json::to_value(entry)?);

    let raw = serde_json::to_string_pretty(&cfg)?;
    fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_install_into_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Claude").join("config.json");

        install_server_entry(&path, &McpServerEntry::stdio("adspirer-mcp", "k-123")).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "mcpServers": {
                    "amazon-ads": {
                        "command": "adspirer-mcp",
                        "args": ["start"],
                        "env": { "API_KEY": "k-123" }
                    }
                }
            })
        );
    }

    #[test]
    fn test_install_preserves_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            json!({
                "theme": "dark",
                "mcpServers": {
                    "other": { "command": "other-server", "disabled": true },
                    "amazon-ads": { "command": "old", "args": [] }
                }
            })
            .to_string(),
        )
        .unwrap();

        install_server_entry(&path, &McpServerEntry::stdio("adspirer-mcp", "new-key")).unwrap();

        let cfg = load_desktop_config(&path);
        assert_eq!(cfg.other["theme"], "dark");
        assert_eq!(cfg.mcp_servers["other"]["disabled"], true);

        let ours: McpServerEntry =
            serde_json::from_value(cfg.mcp_servers[DESKTOP_SERVER_ID].clone()).unwrap();
        assert_eq!(ours, McpServerEntry::stdio("adspirer-mcp", "new-key"));
    }

    #[test]
    fn test_unparseable_config_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        install_server_entry(&path, &McpServerEntry::stdio("adspirer-mcp", "k")).unwrap();

        let cfg = load_desktop_config(&path);
        assert_eq!(cfg.mcp_servers.len(), 1);
        assert!(cfg.other.is_empty());
    }
}

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adspirer_mcp::auth::DEFAULT_AUTH_TIMEOUT_SECS;
use adspirer_mcp::config::{
    McpServerEntry, ServerSettings, desktop_config_path, install_server_entry,
};
use adspirer_mcp::db::{AdvertiserCreate, ApiKeyCreate, Db, QueryBuilder};
use adspirer_mcp::types::{TenantId, UserId};
use adspirer_mcp::{
    Backend, DatabaseConfig, SupabaseConfig, connect_repository, create_authenticator,
    create_connection, create_server, ensure_schema,
};

// rmcp imports for MCP stdio server mode
use rmcp::service::ServiceExt;
use rmcp::transport::stdio;

const HEARTBEAT_INTERVAL_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "adspirer-mcp")]
#[command(about = "Amazon Advertising MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    backend: BackendArgs,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, env = "MCP_DEBUG_LOG")]
    debug_log: Option<PathBuf>,

    /// API key checked by `validateApiKey` and `check`
    #[arg(long, global = true, env = "API_KEY")]
    api_key: Option<String>,

    /// Time budget for one authentication, in seconds
    #[arg(long, global = true, env = "AUTH_TIMEOUT_SECS", default_value_t = DEFAULT_AUTH_TIMEOUT_SECS)]
    auth_timeout_secs: u64,
}

#[derive(Args)]
struct BackendArgs {
    /// Supabase project URL; selects the PostgREST backend together with --supabase-key
    #[arg(long, global = true, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase service key
    #[arg(long, global = true, env = "SUPABASE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// SurrealDB url, used when Supabase is not configured
    #[arg(long, global = true, env = "SURREALDB_URL", default_value = "memory")]
    db_url: String,
}

impl BackendArgs {
    fn backend(&self) -> Backend {
        match (self.supabase_url.as_deref(), self.supabase_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                Backend::Supabase(SupabaseConfig::new(url, key))
            }
            _ => Backend::Surreal(self.db_config()),
        }
    }

    fn db_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.db_url.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run as an MCP stdio server (for use in the desktop config)
    Start,
    /// Run as an MCP HTTP server; sessions authenticate with X-API-Key or a bearer token
    McpHttp {
        /// Bind address, e.g. 0.0.0.0:3942
        #[arg(long, default_value = "0.0.0.0:3942")]
        bind: String,
    },
    /// Register this server in the Claude Desktop config
    Config {
        /// Command the desktop app should launch (defaults to this executable)
        #[arg(long)]
        command: Option<String>,
    },
    /// Authenticate the configured API key and print the advertiser it resolves to
    Check,
    /// Initialize the SurrealDB schema
    Init,
    /// Add an advertiser account (SurrealDB backend)
    CreateAdvertiser {
        #[arg(long)]
        id: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        profile_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "US")]
        marketplace: String,
        #[arg(long, default_value = "seller")]
        account_type: String,
        #[arg(long)]
        country_code: Option<String>,
        #[arg(long)]
        currency_code: Option<String>,
    },
    /// Issue a new API key for an advertiser (SurrealDB backend)
    CreateApiKey {
        #[arg(long)]
        advertiser_id: String,
    },
    /// List API keys in both layouts (SurrealDB backend)
    ListApiKeys,
    /// Deactivate an API key (SurrealDB backend)
    RevokeApiKey { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug_log.as_deref())?;
    install_panic_hook();

    let settings = ServerSettings {
        api_key: cli.api_key.clone().filter(|k| !k.is_empty()),
        auth_timeout: Duration::from_secs(cli.auth_timeout_secs),
        ..Default::default()
    };

    match cli.command {
        Commands::Start => {
            info!(
                name = %settings.name,
                version = %settings.version,
                "Starting MCP stdio server"
            );
            spawn_heartbeat();

            let repo = connect_repository(cli.backend.backend()).await?;
            let authenticator = create_authenticator(repo, &settings);
            let server = create_server(Arc::new(settings), authenticator);

            // Run as an MCP stdio server. McpServer implements ServerHandler.
            let service = server
                .serve(stdio())
                .await
                .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;

            // Block until the MCP session ends.
            service.waiting().await?;
            info!("MCP stdio server session ended");
        }
        Commands::McpHttp { bind } => {
            info!("Starting MCP HTTP server (rmcp) on {}", bind);
            spawn_heartbeat();

            let repo = connect_repository(cli.backend.backend()).await?;
            let authenticator = create_authenticator(repo, &settings);
            let tool_registry = Arc::new(adspirer_mcp::tools::default_registry(
                &settings,
                authenticator.clone(),
            ));

            adspirer_mcp::server::start_mcp_http(
                Arc::new(settings),
                tool_registry,
                authenticator,
                &bind,
            )
            .await?;
        }
        Commands::Config { command } => {
            let api_key = match settings.api_key {
                Some(key) => key,
                None => prompt_api_key()?,
            };
            let command = match command {
                Some(c) => c,
                None => std::env::current_exe()
                    .context("Could not determine the executable path")?
                    .display()
                    .to_string(),
            };

            let path = desktop_config_path()?;
            install_server_entry(&path, &McpServerEntry::stdio(command, api_key))?;

            println!("Claude Desktop config updated: {}", path.display());
            println!("Restart Claude Desktop to load the Amazon Advertising server.");
        }
        Commands::Check => {
            let Some(api_key) = settings.api_key.clone() else {
                bail!("No API_KEY provided in environment variables.");
            };

            let repo = connect_repository(cli.backend.backend()).await?;
            let authenticator = create_authenticator(repo, &settings);

            match authenticator.authenticate(&api_key).await.into_result() {
                Ok(context) => {
                    println!("Connection OK.");
                    println!();
                    println!("  Advertiser ID: {}", context.id);
                    println!("  Account:       {}", context.sort_name());
                    if let Some(marketplace) = &context.marketplace {
                        println!("  Marketplace:   {}", marketplace);
                    }
                    println!("  Currency:      {}", context.metadata.currency_code);
                }
                Err(e) => bail!("Connection check failed: {}", e),
            }
        }
        Commands::Init => {
            info!("Initializing database...");
            admin_db(&cli.backend).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateAdvertiser {
            id,
            user_id,
            profile_id,
            name,
            marketplace,
            account_type,
            country_code,
            currency_code,
        } => {
            let db = admin_db(&cli.backend).await?;

            let mut metadata = serde_json::Map::new();
            if let Some(c) = country_code {
                metadata.insert("countryCode".to_string(), json!(c));
            }
            if let Some(c) = currency_code {
                metadata.insert("currencyCode".to_string(), json!(c));
            }

            let id = QueryBuilder::create_advertiser(
                &db,
                &AdvertiserCreate {
                    id: TenantId::new(id),
                    user_id: UserId::new(user_id),
                    profile_id,
                    account_name: name,
                    marketplace,
                    account_type,
                    connected_since: None,
                    metadata: (!metadata.is_empty()).then(|| metadata.into()),
                },
            )
            .await?;

            println!("Advertiser '{}' created.", id);
        }
        Commands::CreateApiKey { advertiser_id } => {
            let db = admin_db(&cli.backend).await?;
            let advertiser_id = TenantId::new(advertiser_id);

            if QueryBuilder::find_advertiser(&db, &advertiser_id)
                .await?
                .is_none()
            {
                bail!("No advertiser found with id '{}'", advertiser_id);
            }

            let key = uuid::Uuid::new_v4().to_string();
            QueryBuilder::create_api_key(
                &db,
                &ApiKeyCreate {
                    key: key.clone(),
                    advertiser_id: advertiser_id.clone(),
                    active: true,
                },
            )
            .await?;

            println!("API Key created successfully!");
            println!();
            println!("  Key:        {}", key);
            println!("  Advertiser: {}", advertiser_id);
            println!();
            println!("IMPORTANT: Save this key now.");
            println!("Use with: -H 'X-API-Key: {}'", key);
        }
        Commands::ListApiKeys => {
            let db = admin_db(&cli.backend).await?;
            let api_keys = QueryBuilder::list_api_keys(&db).await?;

            if api_keys.is_empty() {
                println!("No API keys found.");
                return Ok(());
            }

            println!(
                "{:<30} {:<8} {:<10} {:<20} {:<20}",
                "ID", "LAYOUT", "STATUS", "ADVERTISER", "USER"
            );
            println!("{}", "-".repeat(90));

            for key in api_keys {
                let status = if key.enabled() { "Active" } else { "Revoked" };
                println!(
                    "{:<30} {:<8} {:<10} {:<20} {:<20}",
                    key.id.to_string(),
                    key.shape().as_str(),
                    status,
                    key.advertiser_id
                        .as_ref()
                        .map(|a| a.as_str())
                        .unwrap_or("-"),
                    key.user_id.as_ref().map(|u| u.as_str()).unwrap_or("-"),
                );
            }
        }
        Commands::RevokeApiKey { key } => {
            let db = admin_db(&cli.backend).await?;

            if QueryBuilder::deactivate_api_key(&db, &key).await? {
                println!("API key has been revoked.");
            } else {
                println!("No API key found with that value.");
            }
        }
    }

    Ok(())
}

/// Log to stderr (stdout carries the stdio MCP channel) or append to a file.
fn init_tracing(debug_log: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter()?);

    match debug_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }

    Ok(())
}

fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("adspirer_mcp=info".parse()?)
        .add_directive("rmcp=warn".parse()?))
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        tracing::error!("panic: {}", panic);
    }));
}

fn spawn_heartbeat() {
    tokio::spawn(async {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            heartbeat();
        }
    });
}

fn heartbeat() {
    info!(interval_secs = HEARTBEAT_INTERVAL_SECS, "heartbeat");
}

/// SurrealDB handle for the admin commands, with the schema ensured.
async fn admin_db(backend: &BackendArgs) -> Result<Db> {
    if let Backend::Supabase(_) = backend.backend() {
        bail!("Admin commands manage the SurrealDB backend; unset SUPABASE_URL/SUPABASE_KEY");
    }

    let config = backend.db_config();
    info!("Using database url: {}", config.url);
    let db = create_connection(config).await?;
    ensure_schema(&db).await?;
    Ok(db)
}

fn prompt_api_key() -> Result<String> {
    eprint!("Enter your Amazon Advertising API key: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    let key = line.trim().to_string();
    if key.is_empty() {
        bail!("An API key is required");
    }
    Ok(key)
}

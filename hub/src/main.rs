use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use mcp_hub::config::{self, McpConfig, McpServerConfig, TransportConfig, TransportKind};
use mcp_hub::mcp::McpClientManager;
use mcp_hub::status;

#[derive(Parser)]
#[command(name = "mcp-hub")]
#[command(about = "Connect to MCP servers and use their tools from one place")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the nearest .mcp.json, then the global settings)
    #[arg(long, global = true, env = "MCP_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Log connection activity
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configured MCP servers
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    /// List available tools from MCP servers
    Tools {
        /// Only list tools from a specific server
        #[arg(long)]
        server: Option<String>,
    },
    /// Call a tool directly
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, short)]
        args: Option<String>,
    },
}

#[derive(Subcommand)]
enum McpCommands {
    /// Add or replace a server in the settings file
    Add {
        name: String,
        /// stdio, sse, streamable-http (or http), ws
        #[arg(long, short, default_value = "stdio")]
        transport: String,
        #[arg(long)]
        command: Option<String>,
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        args: Vec<String>,
        #[arg(long)]
        url: Option<String>,
        /// KEY=VALUE, repeatable
        #[arg(long = "env", short = 'e')]
        env: Vec<String>,
        /// KEY=VALUE, repeatable
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
        /// Operation timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        disabled: bool,
    },
    /// Show the status of every configured server
    List,
    /// Remove a server from the settings file
    Remove { name: String },
    /// Connect to one server and list its tools
    Test { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Mcp { command } => match command {
            McpCommands::Add {
                name,
                transport,
                command,
                args,
                url,
                env,
                headers,
                timeout,
                disabled,
            } => {
                let kind: TransportKind = transport.parse()?;
                let transport = build_transport(kind, command, args, url, &env, &headers)?;
                let server = McpServerConfig {
                    transport,
                    enabled: !disabled,
                    timeout: timeout.filter(|ms| *ms > 0).map(Duration::from_millis),
                };
                let path = settings_path_for_write(cli.config.as_deref())?;
                config::add_server_to_file(&path, &name, &server)?;
                println!("Added MCP server '{}' ({}) to {}", name, kind, path.display());
            }
            McpCommands::List => run_list(cli.config.as_deref()).await?,
            McpCommands::Remove { name } => {
                let path = settings_path_for_write(cli.config.as_deref())?;
                if config::remove_server_from_file(&path, &name)? {
                    println!("Removed MCP server '{}' from {}", name, path.display());
                } else {
                    println!("No MCP server named '{}' in {}", name, path.display());
                }
            }
            McpCommands::Test { name } => run_test(cli.config.as_deref(), &name).await?,
        },
        Commands::Tools { server } => run_tools(cli.config.as_deref(), server).await?,
        Commands::Call { tool, args } => run_call_tool(cli.config.as_deref(), &tool, args).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_transport(
    kind: TransportKind,
    command: Option<String>,
    args: Vec<String>,
    url: Option<String>,
    env: &[String],
    headers: &[String],
) -> Result<TransportConfig> {
    let require_url = |url: Option<String>| -> Result<String> {
        let url = url.with_context(|| format!("--url is required for {} transport", kind))?;
        Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
        Ok(url)
    };

    Ok(match kind {
        TransportKind::Stdio => TransportConfig::Stdio {
            command: command
                .filter(|c| !c.trim().is_empty())
                .context("--command is required for stdio transport")?,
            args,
            env: config::parse_key_value(env)?,
        },
        TransportKind::Sse => TransportConfig::Sse {
            url: require_url(url)?,
            headers: config::parse_key_value(headers)?,
        },
        TransportKind::StreamableHttp => TransportConfig::StreamableHttp {
            url: require_url(url)?,
            headers: config::parse_key_value(headers)?,
        },
        TransportKind::WebSocket => TransportConfig::WebSocket {
            url: require_url(url)?,
        },
    })
}

/// Settings to read: `--config` if given, else the nearest/global file
fn load_settings(explicit: Option<&Path>) -> Result<Option<McpConfig>> {
    match explicit {
        Some(path) if path.exists() => Ok(Some(McpConfig::load_from_path(path)?)),
        Some(path) => {
            tracing::warn!("Settings file {} does not exist", path.display());
            Ok(None)
        }
        None => Ok(McpConfig::load()?.map(|(config, _)| config)),
    }
}

/// Settings file that `mcp add`/`mcp remove` write to
fn settings_path_for_write(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some((_, path)) = McpConfig::load()? {
        return Ok(path);
    }
    config::default_settings_path().context("Could not determine the config directory")
}

fn load_servers(explicit: Option<&Path>) -> Result<Option<(McpConfig, BTreeMap<String, McpServerConfig>)>> {
    let Some(settings) = load_settings(explicit)? else {
        println!("No MCP settings found (.mcp.json or global settings).");
        println!("Add a server with: mcp-hub mcp add <name> --command <cmd>");
        return Ok(None);
    };
    let servers = settings.mcp_servers.clone();
    Ok(Some((settings, servers)))
}

async fn run_list(explicit: Option<&Path>) -> Result<()> {
    let Some((settings, servers)) = load_servers(explicit)? else {
        return Ok(());
    };
    if servers.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }

    let manager = McpClientManager::new(settings.manager_config());
    manager.initialize_from_config(&servers).await;
    let rows = status::collect_rows(&servers, &manager).await;
    manager.disconnect_all().await;

    println!("{:<2} {:<20} {:<16} {:<14} {}", "", "NAME", "TRANSPORT", "STATUS", "TOOLS");
    for row in &rows {
        println!(
            "{:<2} {:<20} {:<16} {:<14} {}",
            row.status.icon(),
            row.name,
            row.transport.as_str(),
            row.status.to_string(),
            row.tools
        );
        if let Some(error) = &row.error {
            println!("   └ {}", error);
        }
    }

    let summary = status::summarize(&rows);
    println!();
    println!(
        "{} connected, {} failed, {} disabled, {} total",
        summary.connected, summary.failed, summary.disabled, summary.total
    );
    Ok(())
}

async fn run_test(explicit: Option<&Path>, name: &str) -> Result<()> {
    let Some((settings, servers)) = load_servers(explicit)? else {
        return Ok(());
    };
    let server = servers
        .get(name)
        .with_context(|| format!("No MCP server named '{}'", name))?
        .clone();

    let manager = McpClientManager::new(settings.manager_config());
    println!("Testing MCP server '{}' ({})...", name, server.kind());

    let outcome = async {
        manager.add_server(name, server).await?;
        let client = manager
            .get_client(name)
            .await
            .with_context(|| format!("Client '{}' missing after connect", name))?;
        Ok::<_, anyhow::Error>(client.get_tools().await?)
    }
    .await;
    manager.disconnect_all().await;

    let tools = outcome?;
    println!("✓ Connected, {} tools available", tools.len());
    for tool in tools {
        println!("  {} - {}", tool.name, first_line(&tool.description));
    }
    Ok(())
}

async fn run_tools(explicit: Option<&Path>, server_filter: Option<String>) -> Result<()> {
    let Some((settings, servers)) = load_servers(explicit)? else {
        return Ok(());
    };
    println!(
        "Configured servers: {}\n",
        servers.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    let manager = McpClientManager::new(settings.manager_config());
    manager.initialize_from_config(&servers).await;
    let failed = manager.get_failed_connections().await;
    let tools = manager.get_all_tools().await;
    manager.disconnect_all().await;

    for (server, error) in &failed {
        eprintln!("✖ {}: {}", server, error);
    }

    let tools = tools?;
    let mut by_server: BTreeMap<&str, Vec<(&String, &str)>> = BTreeMap::new();
    for (key, tool) in &tools {
        if server_filter.as_deref().is_some_and(|s| s != tool.server) {
            continue;
        }
        by_server
            .entry(tool.server.as_str())
            .or_default()
            .push((key, tool.description.as_str()));
    }

    if by_server.is_empty() {
        println!("No tools found.");
        return Ok(());
    }

    for (server, tools) in by_server {
        println!("=== {} ({} tools) ===", server, tools.len());
        for (name, description) in tools {
            println!("  {} - {}", name, first_line(description));
        }
        println!();
    }

    Ok(())
}

async fn run_call_tool(explicit: Option<&Path>, tool_name: &str, args: Option<String>) -> Result<()> {
    let Some((settings, servers)) = load_servers(explicit)? else {
        return Ok(());
    };

    let arguments = match args {
        Some(json) => match serde_json::from_str::<serde_json::Value>(&json)
            .context("--args must be valid JSON")?
        {
            serde_json::Value::Object(map) => Some(map),
            _ => anyhow::bail!("--args must be a JSON object"),
        },
        None => None,
    };

    println!("Calling tool: {}", tool_name);
    if let Some(ref a) = arguments {
        println!("Arguments: {}", serde_json::to_string_pretty(a)?);
    }
    println!();

    let manager = McpClientManager::new(settings.manager_config());
    manager.initialize_from_config(&servers).await;
    let result = manager.execute_tool(tool_name, arguments).await;
    manager.disconnect_all().await;

    println!("Result:");
    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

fn first_line(text: &str) -> &str {
    if text.is_empty() {
        return "No description";
    }
    text.lines().next().unwrap_or("")
}

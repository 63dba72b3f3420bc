use clap::{Parser, Subcommand};
use lifeboard_client::{ClientConfig, ConnectionState, LifecycleClient, ReconnectPolicy};
use lifeboard_discovery::{Discoverer, DiscoveryEvent, DiscoveryRegistry, SocketDiscoverer};
use lifeboard_services::{
    DatabaseService, ProjectService, RequirementsService, TasksService,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lifeboard", about = "Lifeboard — lifecycle dashboard client")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "lifeboard.toml")]
    config: PathBuf,

    /// Server endpoint (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connection, server, and project status
    Status,
    /// List the tools advertised by the server
    Tools,
    /// Stay connected and stream connection and discovery events
    Watch,
    /// Manage requirements
    Requirements {
        #[command(subcommand)]
        action: RequirementsAction,
    },
    /// Manage tasks
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
}

#[derive(Subcommand)]
enum RequirementsAction {
    /// List tracked requirements
    List,
}

#[derive(Subcommand)]
enum TasksAction {
    /// List implementation tasks
    List,
}

#[derive(Deserialize)]
struct LifeboardConfig {
    #[serde(default = "default_endpoint")]
    endpoint: String,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_client_name")]
    client_name: String,
    #[serde(default)]
    reconnect: ReconnectPolicy,
    #[serde(default)]
    discovery: DiscoveryConfig,
}

impl Default for LifeboardConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            client_name: default_client_name(),
            reconnect: ReconnectPolicy::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct DiscoveryConfig {
    #[serde(default = "default_discovery_interval_secs")]
    interval_secs: u64,
    #[serde(default = "default_server_id")]
    server_id: String,
    #[serde(default = "default_server_name")]
    server_name: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_discovery_interval_secs(),
            server_id: default_server_id(),
            server_name: default_server_name(),
        }
    }
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:3917/mcp".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_client_name() -> String {
    "lifeboard".to_string()
}
fn default_discovery_interval_secs() -> u64 {
    30
}
fn default_server_id() -> String {
    "lifecycle".to_string()
}
fn default_server_name() -> String {
    "Lifecycle MCP".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Load config; a missing file means defaults.
    let config: LifeboardConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(raw) => toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid config '{}': {}", cli.config.display(), e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %cli.config.display(), "no config file, using defaults");
            LifeboardConfig::default()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to read config file '{}': {}",
                cli.config.display(),
                e
            ))
        }
    };

    let endpoint = cli.endpoint.unwrap_or_else(|| config.endpoint.clone());
    let mut client_config = ClientConfig::new(endpoint.clone());
    client_config.request_timeout_ms = config.request_timeout_ms;
    client_config.client_name = config.client_name.clone();
    client_config.reconnect = config.reconnect.clone();
    let client = Arc::new(LifecycleClient::new(client_config));

    match cli.command {
        Commands::Status => {
            connect(&client, &endpoint).await?;

            println!("Connection: {}", client.state());
            println!("Endpoint:   {endpoint}");
            if let Some(init) = client.server_handshake() {
                match init.server_info {
                    Some(server) => println!(
                        "Server:     {} {} (protocol {})",
                        server.name, server.version, init.protocol_version
                    ),
                    None => println!("Server:     unknown (protocol {})", init.protocol_version),
                }
            }

            let project = ProjectService::new(Arc::clone(&client));
            let env = project.status().await;
            if let Some(status) = env.data {
                println!("Project:    {} ({})", status.name, status.phase);
                let mut counts: Vec<_> = status.counts.iter().collect();
                counts.sort();
                for (kind, count) in counts {
                    println!("            {count} {kind}");
                }
            } else if let Some(error) = env.error {
                println!("Project:    unavailable ({error})");
            }

            let database = DatabaseService::new(Arc::clone(&client));
            let env = database.info().await;
            if let Some(db) = env.data {
                let size = db
                    .size_bytes
                    .map_or_else(|| "size unknown".to_string(), |b| format!("{b} bytes"));
                let schema = db.schema_version.unwrap_or_else(|| "?".to_string());
                println!("Database:   {} ({size}, schema {schema})", db.engine);
            }

            client.disconnect().await;
        }
        Commands::Tools => {
            connect(&client, &endpoint).await?;

            let registry = DiscoveryRegistry::new();
            let discoverer = Arc::new(SocketDiscoverer::new(
                config.discovery.server_id.clone(),
                config.discovery.server_name.clone(),
                Arc::clone(&client),
            ));
            let caps = discoverer.capabilities().await;
            registry.register(discoverer).await;

            let tools = registry
                .discover_tools_for_server(&config.discovery.server_id)
                .await?;

            if tools.is_empty() {
                println!("No tools advertised by {}.", config.discovery.server_name);
            } else {
                println!("Tools advertised by {}:", config.discovery.server_name);
                for tool in &tools {
                    println!("  {} — {}", tool.name, tool.description);
                }
                println!("\nTotal: {} tool(s)", tools.len());
            }
            if let Ok(caps) = caps {
                let mut sections = Vec::new();
                if caps.tools.is_some() {
                    sections.push("tools");
                }
                if caps.resources.is_some() {
                    sections.push("resources");
                }
                if caps.prompts.is_some() {
                    sections.push("prompts");
                }
                println!("Capabilities: {}", sections.join(", "));
            }

            registry.shutdown().await;
            client.disconnect().await;
        }
        Commands::Watch => {
            connect(&client, &endpoint).await?;

            let registry = DiscoveryRegistry::new();
            registry
                .register(Arc::new(SocketDiscoverer::new(
                    config.discovery.server_id.clone(),
                    config.discovery.server_name.clone(),
                    Arc::clone(&client),
                )))
                .await;
            registry.start_auto_discovery(Duration::from_secs(config.discovery.interval_secs));

            watch_events(&client, &registry, &endpoint).await;

            registry.shutdown().await;
            client.disconnect().await;
        }
        Commands::Requirements { action } => match action {
            RequirementsAction::List => {
                connect(&client, &endpoint).await?;
                let service = RequirementsService::new(Arc::clone(&client));
                let env = service.list().await;
                client.disconnect().await;

                if !env.success {
                    anyhow::bail!(
                        "requirements list failed: {}",
                        env.error.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
                let items = env.data.unwrap_or_default();
                if items.is_empty() {
                    println!("No requirements.");
                } else {
                    println!("Requirements:");
                    for req in &items {
                        println!(
                            "  {:<10} {:<13} {:<9} {}",
                            req.id, req.status, req.priority, req.title
                        );
                    }
                    println!("\nTotal: {} requirement(s)", items.len());
                }
            }
        },
        Commands::Tasks { action } => match action {
            TasksAction::List => {
                connect(&client, &endpoint).await?;
                let service = TasksService::new(Arc::clone(&client));
                let env = service.list().await;
                client.disconnect().await;

                if !env.success {
                    anyhow::bail!(
                        "tasks list failed: {}",
                        env.error.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
                let items = env.data.unwrap_or_default();
                if items.is_empty() {
                    println!("No tasks.");
                } else {
                    println!("Tasks:");
                    for task in &items {
                        let assignee = task.assignee.as_deref().unwrap_or("-");
                        println!(
                            "  {:<10} {:<12} {:<9} {:<12} {}",
                            task.id, task.status, task.priority, assignee, task.title
                        );
                    }
                    println!("\nTotal: {} task(s)", items.len());
                }
            }
        },
    }

    Ok(())
}

async fn connect(client: &Arc<LifecycleClient>, endpoint: &str) -> anyhow::Result<()> {
    info!(endpoint, "connecting");
    client
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("could not connect to {endpoint}: {e}"))
}

/// Streams state, discovery, and server events to the terminal until Ctrl-C.
async fn watch_events(
    client: &Arc<LifecycleClient>,
    registry: &DiscoveryRegistry,
    endpoint: &str,
) {
    let mut states = client.subscribe_states();
    let mut notes = client.subscribe_notifications();
    let mut events = registry.subscribe();
    let mut status_poll = tokio::time::interval(Duration::from_secs(5));

    println!("Watching {endpoint} — Ctrl-C to stop");
    println!("[state] {}", client.state());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                return;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return;
                }
                let state = *states.borrow_and_update();
                println!("[state] {state}");
                if state == ConnectionState::Failed {
                    println!("[state] reconnect attempts exhausted; run `lifeboard status` to retry");
                }
            }
            event = events.recv() => match event {
                Ok(DiscoveryEvent::ToolsUpdated { server_id, tools }) => {
                    println!("[discovery] {server_id}: {} tool(s)", tools.len());
                }
                Ok(DiscoveryEvent::ServerDisconnected { server_id }) => {
                    println!("[discovery] {server_id}: disconnected");
                }
                Err(RecvError::Lagged(missed)) => {
                    println!("[discovery] lagged behind, missed {missed} event(s)");
                }
                Err(RecvError::Closed) => return,
            },
            note = notes.recv() => match note {
                Ok(note) => println!("[server] {}", note.method),
                Err(RecvError::Lagged(missed)) => {
                    println!("[server] lagged behind, missed {missed} notification(s)");
                }
                Err(RecvError::Closed) => return,
            },
            _ = status_poll.tick() => {
                registry.update_server_statuses().await;
            }
        }
    }
}

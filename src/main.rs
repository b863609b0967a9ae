//! lance-chat: chat with a lance-mcp document index from the terminal.
//!
//! Launches the lance-mcp server as a child process, talks MCP to it over
//! stdio, and feeds search results to a local or hosted LLM.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use lance_chat::chat::{spawn_line_reader, ChatApp};
use lance_chat::config::{load_config, resolve_existing_path, AppConfig};
use lance_chat::inference::ProviderManager;
use lance_chat::mcp_client::types::ServerInfo;
use lance_chat::mcp_client::{ClientConfig, Invoker, McpClient, Session, StdioTransport};

#[derive(Parser)]
#[command(name = "lance-chat", version)]
#[command(about = "Chat with your documents through a lance-mcp server")]
struct Cli {
    /// Config file (default: <config_dir>/lance-chat/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive document chat (default)
    Chat(ChatArgs),
    /// Connect and list the server's tools
    Tools(ServerArgs),
    /// Connect and call a single tool
    Call(CallArgs),
    /// Step through handshake, discovery and a sample search, printing each reply
    Probe(ServerArgs),
}

#[derive(Args, Default)]
struct ServerArgs {
    /// Path to the lance-mcp server script
    #[arg(long)]
    server_path: Option<String>,

    /// Path to the document index
    #[arg(long)]
    db_path: Option<String>,

    /// Runtime used to launch the server script
    #[arg(long)]
    runtime: Option<String>,
}

#[derive(Args, Default)]
struct ChatArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Ollama model
    #[arg(long)]
    ollama_model: Option<String>,

    /// OpenAI model
    #[arg(long)]
    openai_model: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
}

#[derive(Args)]
struct CallArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Tool name
    tool: String,

    /// Tool arguments as a JSON object
    #[arg(default_value = "{}")]
    arguments: String,

    /// Per-call timeout in seconds (0 waits forever)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // File logging only: stdout belongs to the REPL.
    if let Err(e) = lance_chat::init_tracing(cli.verbose) {
        eprintln!("warning: logging disabled: {e}");
    }

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or_else(|| Command::Chat(ChatArgs::default())) {
        Command::Chat(args) => run_chat(&mut config, args).await,
        Command::Tools(args) => run_tools(&mut config, &args).await,
        Command::Call(args) => run_call(&mut config, args).await,
        Command::Probe(args) => run_probe(&mut config, &args).await,
    }
}

/// Apply CLI overrides and resolve the server and db paths.
fn client_config(config: &mut AppConfig, args: &ServerArgs) -> Result<ClientConfig> {
    if let Some(runtime) = &args.runtime {
        config.server.runtime = runtime.clone();
    }
    if let Some(path) = &args.server_path {
        config.server.server_path = path.clone();
    }
    if let Some(path) = &args.db_path {
        config.server.db_path = path.clone();
    }

    let server_path = resolve_existing_path("MCP server script", &config.server.server_path)?;
    let db_path = resolve_existing_path("database", &config.server.db_path)?;

    tracing::info!(
        runtime = %config.server.runtime,
        server_path = %server_path.display(),
        db_path = %db_path.display(),
        "resolved server paths"
    );

    Ok(config.server.client_config(&server_path, &db_path))
}

async fn connect(client_config: ClientConfig) -> Result<McpClient> {
    let server = client_config.server.name.clone();
    McpClient::start(client_config)
        .await
        .with_context(|| format!("failed to connect to MCP server '{server}'"))
}

fn describe_server(info: &ServerInfo) -> String {
    format!(
        "{} {}",
        info.name.as_deref().unwrap_or("unnamed"),
        info.version.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

// ─── Subcommands ─────────────────────────────────────────────────────────────

async fn run_chat(config: &mut AppConfig, args: ChatArgs) -> Result<()> {
    if let Some(model) = args.ollama_model {
        config.providers.ollama.model = model;
    }
    if let Some(model) = args.openai_model {
        config.providers.openai.model = model;
    }
    if args.openai_api_key.is_some() {
        config.providers.openai.api_key = args.openai_api_key;
    }

    let client_config = client_config(config, &args.server)?;
    let providers = ProviderManager::from_config(&config.providers)?;
    if providers.is_empty() {
        println!("Warning: no LLM providers configured; chat replies are disabled.");
    }

    println!("Starting MCP server...");
    let mcp = connect(client_config).await?;
    println!("Connected. {} tools available.", mcp.tools().len());

    // Input is read on its own thread: a read still pending after Ctrl-C
    // must not keep the process alive.
    let lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    let mut app = ChatApp::new(mcp, providers, std::io::stdout());
    app.run(lines).await?;
    Ok(())
}

async fn run_tools(config: &mut AppConfig, args: &ServerArgs) -> Result<()> {
    let mut mcp = connect(client_config(config, args)?).await?;

    if let Some(info) = mcp.server_info() {
        println!("Server: {}", describe_server(info));
    }
    println!("{} tools:", mcp.tools().len());
    for tool in mcp.tools().iter() {
        println!("\n{}", tool.name);
        if !tool.description.is_empty() {
            println!("  {}", tool.description);
        }
        println!("  schema: {}", tool.input_schema);
    }

    mcp.shutdown().await;
    Ok(())
}

async fn run_call(config: &mut AppConfig, args: CallArgs) -> Result<()> {
    let arguments: Value = serde_json::from_str(&args.arguments)
        .with_context(|| format!("tool arguments are not valid JSON: {}", args.arguments))?;

    let mut client_config = client_config(config, &args.server)?;
    if let Some(secs) = args.timeout_secs {
        client_config.call_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let mut mcp = connect(client_config).await?;
    let result = mcp.call_strict(&args.tool, arguments).await;
    mcp.shutdown().await;

    let text = result.with_context(|| format!("tool '{}' failed", args.tool))?;
    println!("{text}");
    Ok(())
}

/// Drive the session layer directly so every step is visible.
async fn run_probe(config: &mut AppConfig, args: &ServerArgs) -> Result<()> {
    let client_config = client_config(config, args)?;
    let server = &client_config.server;
    println!("Launching: {} {}", server.command, server.args.join(" "));

    let transport = StdioTransport::start(server, client_config.shutdown_grace)?;
    println!("Started (pid {})", transport.pid().unwrap_or_default());

    let mut session = Session::new(
        transport,
        client_config.client_info.clone(),
        client_config.init_timeout,
    );
    let outcome = probe_steps(&mut session, client_config.call_timeout).await;
    session.close().await;
    println!("\nServer stopped.");
    outcome
}

async fn probe_steps(session: &mut Session, call_timeout: Option<Duration>) -> Result<()> {
    println!("\n1. initialize");
    session.handshake().await?;
    match session.server_info() {
        Some(info) => println!("   server: {}", describe_server(info)),
        None => println!("   server did not identify itself"),
    }
    println!(
        "   protocol: {}",
        session.protocol_version().unwrap_or("unspecified")
    );

    println!("\n2. tools/list");
    let catalog = session.discover_tools().await?;
    for name in catalog.names() {
        println!("   - {name}");
    }

    println!("\n3. tools/call catalog_search {{\"text\": \"test\"}}");
    let reply = Invoker::new(session, call_timeout)
        .search_catalog("test")
        .await?;
    println!("{reply}");
    Ok(())
}

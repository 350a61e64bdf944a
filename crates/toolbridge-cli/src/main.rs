//! Toolbridge CLI - interactive MCP chat client
//!
//! Thin REPL over toolbridge-core: connect to a configured server, stream
//! answers, switch servers. All orchestration lives in the core crate.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use toolbridge_core::{Config, QueryEvent, ToolClient};

#[derive(Parser)]
#[command(name = "toolbridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat with MCP tool servers through a pluggable LLM backend", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    config: PathBuf,

    /// Server to connect to (defaults to the only configured server)
    server: Option<String>,

    /// Override the configured provider (openai, gemini, ollama)
    #[arg(short, long)]
    provider: Option<String>,

    /// Override the configured model
    #[arg(short, long)]
    model: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(provider) = cli.provider {
        config.provider.provider = provider;
    }
    if let Some(model) = cli.model {
        config.provider.model = Some(model);
    }

    let mut editor = DefaultEditor::new()?;
    let mut client = ToolClient::from_config(config)?;

    let server = match cli.server {
        Some(name) => name,
        None => match select_server(&client, &mut editor)? {
            Some(name) => name,
            None => {
                println!("No server selected. Exiting.");
                return Ok(());
            }
        },
    };

    println!("Connecting to server '{}'...", server);
    let result = match client.connect_to_server(&server).await {
        Ok(info) => {
            let tool_count = client.available_tools().map(|t| t.len()).unwrap_or(0);
            println!(
                "{} Connected to '{}' ({} v{}) with {} tools available",
                style("✔").green(),
                server,
                info.name,
                info.version,
                tool_count,
            );
            chat_loop(&mut client, &mut editor).await
        }
        Err(e) => Err(anyhow::anyhow!("Error connecting to server: {}", e)),
    };

    client.disconnect().await;
    result
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "toolbridge=debug" } else { "toolbridge=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Pick a server when none was named: auto-select a lone entry, otherwise
/// prompt with a numbered list
fn select_server(client: &ToolClient, editor: &mut DefaultEditor) -> anyhow::Result<Option<String>> {
    let servers = client.available_servers();

    if servers.is_empty() {
        anyhow::bail!("No servers found in the configuration file");
    }

    if servers.len() == 1 {
        println!("Only one server configured, selecting: {}", servers[0]);
        return Ok(Some(servers[0].clone()));
    }

    println!("\nAvailable servers:");
    for (i, name) in servers.iter().enumerate() {
        println!("{}. {}", i + 1, name);
    }

    loop {
        let choice = match editor.readline("\nSelect a server (number or name): ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Ok(idx) = choice.parse::<usize>() {
            if idx >= 1 && idx <= servers.len() {
                return Ok(Some(servers[idx - 1].clone()));
            }
            println!("Invalid selection. Please choose a valid number.");
            continue;
        }

        if servers.contains(&choice) {
            return Ok(Some(choice));
        }
        println!("Server not found. Please enter a valid server name or number.");
    }
}

async fn chat_loop(client: &mut ToolClient, editor: &mut DefaultEditor) -> anyhow::Result<()> {
    println!("\nType your queries, or 'quit' to exit.");
    println!("Commands: 'servers' lists servers, 'connect <name>' switches, 'tools' lists tools.\n");

    loop {
        let query = match editor.readline("query> ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        if query.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(&query);

        match query.as_str() {
            "quit" => break,
            "servers" => {
                println!("\nAvailable servers:");
                for (i, name) in client.available_servers().iter().enumerate() {
                    let active = if Some(name.as_str()) == client.active_server() {
                        " (ACTIVE)"
                    } else {
                        ""
                    };
                    println!("{}. {}{}", i + 1, name, active);
                }
                continue;
            }
            "tools" => {
                match client.available_tools() {
                    Ok(tools) => {
                        println!("\nAvailable tools:");
                        for tool in tools {
                            println!("- {}: {}", tool.name, tool.description);
                        }
                    }
                    Err(e) => println!("{} {}", style("✗").red(), e),
                }
                continue;
            }
            _ => {}
        }

        if let Some(name) = query.strip_prefix("connect ") {
            let name = name.trim();
            println!("Connecting to server '{}'...", name);
            match client.connect_to_server(name).await {
                Ok(_) => println!("{} Connected to '{}'", style("✔").green(), name),
                Err(e) => println!("{} {}", style("✗").red(), e),
            }
            continue;
        }

        if let Err(e) = run_query(client, &query).await {
            println!("\n{} {}", style("✗").red(), e);
        }
    }

    Ok(())
}

/// Stream one query, rendering events as they arrive
async fn run_query(client: &mut ToolClient, query: &str) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(64);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render_event(&event);
        }
        println!();
    });

    let result = client.process_query_streaming(query, tx).await;
    // The sender is gone once the query finishes; the printer drains and exits
    let _ = printer.await;

    result?;
    Ok(())
}

fn render_event(event: &QueryEvent) {
    match event {
        QueryEvent::Chunk(text) => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        QueryEvent::ToolCall { name, arguments } => {
            println!("\n\n🔧 Using tool: {}", style(name).cyan());
            println!("📝 Parameters: {}", arguments);
        }
        QueryEvent::ToolResult { success: true, text, .. } => {
            println!("📊 Result:\n{}", text);
        }
        QueryEvent::ToolResult { success: false, text, .. } => {
            println!("{} {}", style("✗").red(), text);
        }
        QueryEvent::Notice(text) => {
            println!("\n{}", style(text).yellow());
        }
    }
}

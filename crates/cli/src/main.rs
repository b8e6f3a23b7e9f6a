mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runtime::{Bridge, McpConnector, OllamaProvider, ToolDescriptor};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, Overrides};
use error::Result;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Chat with a local model that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./relay.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SSE endpoint of the tool host
    #[arg(long, env = "MCP_SSE_URL", global = true)]
    url: Option<String>,

    /// Ollama model name
    #[arg(long, env = "OLLAMA_MODEL", global = true)]
    model: Option<String>,

    /// Ollama server address
    #[arg(long, env = "OLLAMA_HOST", global = true)]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List the tools the host offers
    Tools,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::discover(cli.config.as_deref())?;
    config.apply(Overrides {
        url: cli.url,
        model: cli.model,
        ollama_url: cli.ollama_url,
    });
    debug!(?config, "configuration loaded");

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config),
        Some(Commands::Tools) => cmd_tools(&config),
    }
}

fn start_bridge(config: &Config) -> Result<Bridge> {
    let endpoint = config.endpoint()?;
    let (timeout, connect_timeout) = config.provider_timeouts()?;

    let provider = OllamaProvider::builder(&config.provider.model)
        .base_url(&config.provider.base_url)
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .build()?;
    let connector = McpConnector::new(endpoint).with_seed_prompt(&config.host.seed_prompt);

    Ok(Bridge::spawn(provider, connector, config.bridge_limits()?)?)
}

fn cmd_chat(config: &Config) -> Result<()> {
    println!("relay v{}", env!("CARGO_PKG_VERSION"));
    println!("Tool host: {}", config.endpoint()?);
    println!("Model: {} at {}", config.provider.model, config.provider.base_url);

    let mut bridge = start_bridge(config)?;
    connect_and_report(&mut bridge);
    println!("Type 'quit' or Ctrl+D to exit. Commands: /tools /reset /status /reconnect\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => break,
            "/reset" => match bridge.reset() {
                Ok(()) => println!("History cleared.\n"),
                Err(e) => println!("Error: {e}\n"),
            },
            "/tools" => match bridge.tools() {
                Ok(tools) => print_tools(&tools),
                Err(e) => println!("Error: {e}\n"),
            },
            "/status" => println!("Status: {}\n", bridge.status()),
            "/reconnect" => connect_and_report(&mut bridge),
            _ => match bridge.submit(input) {
                Ok(answer) => println!("\n{answer}\n"),
                Err(e) => println!("\nError: {e}\n"),
            },
        }
    }

    bridge.shutdown();
    println!("\nSession ended.");
    Ok(())
}

fn cmd_tools(config: &Config) -> Result<()> {
    let mut bridge = start_bridge(config)?;
    let summary = bridge.connect()?;
    for warning in &summary.warnings {
        eprintln!("Warning: {warning}");
    }

    print_tools(&bridge.tools()?);
    bridge.shutdown();
    Ok(())
}

fn connect_and_report(bridge: &mut Bridge) {
    match bridge.connect() {
        Ok(summary) => {
            if summary.tools.is_empty() {
                println!("Connected. No tools available.");
            } else {
                println!("Connected. Tools: {}", summary.tools.join(", "));
            }
            for warning in &summary.warnings {
                println!("Warning: {warning}");
            }
        }
        Err(e) => {
            warn!(error = %e, "tool host connection failed");
            println!("Could not connect to the tool host: {e}");
            println!("Use /reconnect to try again.");
        }
    }
}

fn print_tools(tools: &[ToolDescriptor]) {
    if tools.is_empty() {
        println!("No tools available.\n");
        return;
    }

    println!("{:<24}  DESCRIPTION", "NAME");
    println!("{}", "-".repeat(80));
    for tool in tools {
        let description = tool.description.lines().next().unwrap_or_default();
        println!("{:<24}  {description}", tool.name);
    }
    println!();
}

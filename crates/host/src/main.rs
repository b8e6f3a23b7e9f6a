//! Reference MCP tool host.
//!
//! Speaks newline-delimited JSON-RPC on stdio by default, or serves the
//! HTTP + SSE transport with `--sse <ADDR>`. Logging always goes to stderr.

mod error;
mod prompts;
mod server;
mod sse;
mod tools;

use std::net::SocketAddr;

use clap::Parser;
use tokio::io::{BufReader, stdin, stdout};
use tracing_subscriber::EnvFilter;

use error::Result;
use server::Server;
use tools::Toolbox;
use tools::weather::{NWS_API_BASE, NwsClient};

#[derive(Parser)]
#[command(name = "relay-host")]
#[command(about = "MCP tool host with weather and calculator tools", long_about = None)]
#[command(version)]
struct Args {
    /// Base URL of the National Weather Service API
    #[arg(long, env = "NWS_API_BASE", default_value = NWS_API_BASE)]
    nws_url: String,

    /// Serve HTTP + SSE on this address (e.g. 127.0.0.1:8080) instead of stdio
    #[arg(long, value_name = "ADDR")]
    sse: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let toolbox = Toolbox::new(NwsClient::new(args.nws_url)?);
    match args.sse {
        Some(addr) => sse::serve(addr, toolbox).await,
        None => {
            Server::new(toolbox)
                .serve(BufReader::new(stdin()), stdout())
                .await
        }
    }
}

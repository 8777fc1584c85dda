//! wbridge sync responder - hosts the synchronous call bridge over HTTP.
//!
//! Blocked callers request a source id with `GetId`, send their call through
//! the ordinary envelope path, then block on `GetResult`. Replies reach the
//! store with `SetResult`.

mod handler;
mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wbridge_core::{SyncConfig, SyncService};

#[derive(Parser, Debug)]
#[command(name = "wbridge-sync")]
#[command(about = "Synchronous call responder for wbridge")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// How long GetResult waits for a result, in milliseconds
    #[arg(long, default_value_t = SyncConfig::RESULT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting wbridge sync responder");

    let service = Arc::new(SyncService::with_timeout(Duration::from_millis(args.timeout_ms)));
    let addr = server::start_server(service, &args.host, args.port).await?;

    // Parent processes read the port from this line
    println!("SYNC_PORT={}", addr.port());

    info!("Sync responder running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}

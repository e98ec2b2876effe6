use clap::Parser;
use log::{error, info};
use server::network::Server;
use std::time::Duration;

/// Authoritative server for cooldown chess
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "3000")]
    port: u16,
    /// Scheduler tick in milliseconds; bounds how late a queued move can fire
    #[clap(short, long, default_value = "100")]
    tick_ms: u64,
    /// Maximum number of concurrent sockets
    #[clap(short, long, default_value = "256")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::bind(
        &address,
        Duration::from_millis(args.tick_ms.max(1)),
        args.max_clients,
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

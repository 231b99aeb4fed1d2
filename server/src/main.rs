use clap::Parser;
use log::{error, info};
use server::config::{parse_seed_accounts, ServerConfig};
use server::game::World;
use server::gateway::InMemoryPlayerStore;
use server::network::Server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Directory containing the binary map files
    #[arg(short, long, default_value = "maps")]
    maps_dir: PathBuf,

    /// Number of distinct floor tiles a map may reference
    #[arg(long, default_value = "64")]
    floor_count: u16,

    /// Number of distinct items a map may reference
    #[arg(long, default_value = "64")]
    item_count: u16,

    /// Length of one regeneration time unit in milliseconds
    #[arg(short, long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    time_unit_ms: u64,

    /// JSON file of accounts to create at startup
    #[arg(short, long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        maps_dir: args.maps_dir,
        floor_count: args.floor_count,
        item_count: args.item_count,
        time_unit: Duration::from_millis(args.time_unit_ms),
    };

    info!("Starting server...");
    info!("Maps directory: {}", config.maps_dir.display());
    info!("Regeneration time unit: {:?}", config.time_unit);

    let world = World::new(config, Arc::new(InMemoryPlayerStore::new()));

    if let Some(path) = &args.seed {
        let accounts = parse_seed_accounts(&tokio::fs::read_to_string(path).await?)?;
        let created = world.seed_accounts(&accounts).await?;
        info!("Seeded {} account(s) from {}", created, path.display());
    }

    let server = Server::bind(world).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

use clap::Parser;
use log::info;
use server::{Server, ServerConfig, WorldConfig};
use std::time::Duration;

/// Authoritative replication server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Replication range in cells
    #[arg(short, long, default_value = "16")]
    view_range: u32,

    /// Monsters populated at startup
    #[arg(long, default_value = "24")]
    monsters: usize,

    /// Seconds between character saves
    #[arg(long, default_value = "30")]
    persist_interval: u64,

    #[arg(long, default_value = "128")]
    map_width: i32,

    #[arg(long, default_value = "128")]
    map_height: i32,

    /// Seed for monster placement and wandering
    #[arg(long, default_value = "24301")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Tip: Set RUST_LOG=info to see server logs");
        eprintln!("Example: RUST_LOG=info cargo run --bin server");
    }

    let args = Args::parse();

    let defaults = WorldConfig::default();
    let world = WorldConfig {
        map_width: args.map_width,
        map_height: args.map_height,
        replication_range: args.view_range,
        monster_count: args.monsters,
        seed: args.seed,
        spawn_point: shared::Coordinate::new(args.map_width / 2, args.map_height / 2),
        ..defaults
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        persist_interval: Duration::from_secs(args.persist_interval),
        world,
    };

    info!(
        "Starting server on {} at {} Hz, map {} ({}x{})",
        config.address(),
        config.tick_rate,
        config.world.map_name,
        config.world.map_width,
        config.world.map_height
    );

    let mut server = Server::new(config).await?;
    server.run().await
}

use clap::Parser;
use client::config::ClientConfig;
use client::network::Client;
use log::info;

/// Headless client that mirrors the world and drives a bot player
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Cells around the player that get a mirror
    #[arg(short, long, default_value = "14")]
    view_range: u32,

    /// Client tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Character name
    #[arg(short, long, default_value = "novice")]
    name: String,

    /// Seed for the request bot
    #[arg(long, default_value = "7")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let config = ClientConfig {
        server_addr: args.server,
        name: args.name,
        fake_ping_ms: args.fake_ping,
        view_range: args.view_range,
        tick_rate: args.tick_rate,
        seed: args.seed,
        ..ClientConfig::default()
    };

    let mut client = Client::new(config).await?;
    client.run().await?;

    Ok(())
}

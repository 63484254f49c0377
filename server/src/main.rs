use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::SimConfig;

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
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Physics sub-steps per tick
    #[arg(long, default_value = "1")]
    substeps: u32,

    /// How long entity history is kept for lag compensation, in ms
    #[arg(long, default_value = "1000")]
    retention_ms: u64,

    /// Interpolation delay clients are expected to run with, in ms
    #[arg(long, default_value = "100")]
    buffer_ms: u64,

    /// Broad-phase distance before the swept collision test runs
    #[arg(long, default_value = "400")]
    broad_phase: f32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = SimConfig {
        substeps: args.substeps,
        history_retention_ms: args.retention_ms,
        playback_buffer_ms: args.buffer_ms,
        broad_phase_distance: args.broad_phase,
        ..SimConfig::with_tick_rate(args.tick_rate)
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let address = format!("{}:{}", args.host, args.port);
    info!(
        "Starting server on {} at {}Hz (history {}ms, buffer {}ms)",
        address, args.tick_rate, args.retention_ms, args.buffer_ms
    );

    let mut server = Server::new(&address, config, args.max_clients).await?;
    server.run().await?;

    Ok(())
}

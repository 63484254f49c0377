use clap::Parser;
use client::input::Autopilot;
use client::network::Client;
use log::info;
use shared::SimConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Local update rate (frames per second)
    #[arg(short = 'r', long, default_value = "60")]
    frame_rate: u32,

    /// How far playback runs behind the newest snapshot, in ms
    #[arg(short = 'b', long, default_value = "100")]
    buffer_ms: u64,

    /// Milliseconds between scripted shots, 0 to hold fire
    #[arg(short = 'f', long, default_value = "400")]
    fire_period: u64,

    /// Milliseconds between scripted turn reversals
    #[arg(long, default_value = "2000")]
    weave_period: u64,

    /// Stop after this many seconds
    #[arg(short = 'd', long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = SimConfig {
        playback_buffer_ms: args.buffer_ms,
        history_retention_ms: args.buffer_ms.max(SimConfig::default().history_retention_ms),
        ..SimConfig::with_tick_rate(args.frame_rate)
    };
    config.validate()?;

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Playback buffer: {}ms", args.buffer_ms);

    let mut client = Client::new(
        &args.server,
        config,
        args.fake_ping,
        Autopilot::new(args.weave_period, args.fire_period),
        args.duration.map(Duration::from_secs),
    )
    .await?;

    client.run().await?;

    Ok(())
}

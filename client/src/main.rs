use clap::Parser;
use client::network::{Client, ClientConfig};
use log::info;
use std::time::Duration;
use tokio::task::LocalSet;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:7777")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Frame interval in milliseconds; deferred snippets run once per frame
    #[arg(short = 'f', long, default_value = "16")]
    frame_ms: u64,

    /// Game seconds per real second
    #[arg(short = 't', long, default_value = "20.0")]
    timescale: f32,

    /// Protocol version announced in the connect handshake
    #[arg(long, default_value_t = shared::CLIENT_VERSION)]
    client_version: u32,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        ClientConfig {
            server_addr: args.server,
            fake_ping_ms: args.fake_ping,
            frame_interval: Duration::from_millis(args.frame_ms.max(1)),
            timescale: args.timescale,
            client_version: args.client_version,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
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
    info!("Frame interval {}ms, timescale {}", args.frame_ms, args.timescale);

    // snippet handling shares Rc state, so everything stays on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();

    local.block_on(&runtime, async move {
        let mut client = Client::new(args.into()).await?;
        client.run().await
    })?;

    Ok(())
}

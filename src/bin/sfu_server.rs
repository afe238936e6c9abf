//! SFU server binary entry point
//!
//! Serves JSON-RPC 2.0 signaling over WebSocket and routes media between
//! the participants of each session.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default signaling address
//! cargo run --bin sfu_server
//!
//! # Custom address and ICE port range
//! cargo run --bin sfu_server -- \
//!   --addr 0.0.0.0:7000 \
//!   --ice-port-min 50000 \
//!   --ice-port-max 60000
//! ```

use clap::Parser;
use rtc_sfu::{Config, ReceiverConfig, Sfu, SignalingServer, VideoReceiverConfig, WebRtcConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Selective forwarding unit for real-time conferencing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket signaling listen address
    #[arg(short, long, default_value = "0.0.0.0:7000", env = "SFU_ADDR")]
    addr: String,

    /// Low end of the ephemeral UDP port range for ICE
    #[arg(long, default_value_t = 50000)]
    ice_port_min: u16,

    /// High end of the ephemeral UDP port range for ICE
    #[arg(long, default_value_t = 60000)]
    ice_port_max: u16,

    /// REMB feedback interval in seconds (0 disables)
    #[arg(long, default_value_t = 2)]
    remb_cycle: u64,

    /// PLI feedback interval in seconds (0 disables)
    #[arg(long, default_value_t = 1)]
    pli_cycle: u64,

    /// Transport-wide congestion control feedback interval in seconds (0 disables)
    #[arg(long, default_value_t = 1)]
    tcc_cycle: u64,

    /// REMB bandwidth cap in kbps
    #[arg(long, default_value_t = 1000)]
    max_bandwidth: u64,

    /// Replay buffer retention in milliseconds
    #[arg(long, default_value_t = 1000)]
    max_buffer_time: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = Config {
        webrtc: WebRtcConfig {
            ice_port_range: Some((args.ice_port_min, args.ice_port_max)),
            ice_servers: vec![],
        },
        receiver: ReceiverConfig {
            video: VideoReceiverConfig {
                remb_cycle: args.remb_cycle,
                pli_cycle: args.pli_cycle,
                tcc_cycle: args.tcc_cycle,
                max_bandwidth: args.max_bandwidth,
                max_buffer_time: args.max_buffer_time,
            },
        },
    };

    info!("starting sfu {}", rtc_sfu::version());

    let sfu = Sfu::new(config);
    SignalingServer::new(sfu).run(&args.addr).await?;

    Ok(())
}

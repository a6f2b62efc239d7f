//! Standalone relay server binary: the untrusted UDP forwarder clients
//! register with when LAN discovery will not reach them (§4.4).

use std::net::SocketAddr;

use clap::Parser;
use dni_discovery::relay::RelayServer;

#[derive(Parser)]
#[command(name = "dni-relay-server", author, version, about = "Untrusted relay forwarder for dni-im", long_about = None)]
struct Cli {
    /// Address to bind the relay's UDP socket to.
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: SocketAddr,

    /// Log verbosity (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(cli.log_level).init();

    let server = RelayServer::bind(cli.bind).await?;
    tracing::info!(addr = %server.local_addr()?, "relay server listening");
    server.run().await?;
    Ok(())
}

//! Terminal front-end for dni-im (§5, §6).
//!
//! Wires together the three-task runtime the core is designed around: a
//! Receive task draining the UDP transport, a Discovery task draining the
//! LAN/relay fabric, and a Session task that owns the `SessionManager` and
//! is the only thing that ever touches it. The REPL and the Session task
//! talk over the same command channel everything else uses.

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dni_core::{
    packet::Packet,
    peer::PeerEndpoint,
    Command, Config, ContactBook, Event, Identity, MessageQueue, PacketSink, SendOutcome,
    SessionManager,
};
use dni_discovery::{DiscoveryConfig, DiscoveryFabric};
use dni_transport::transport::Transport;
use dni_transport::udp_async::AsyncUdpTransport;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Parser)]
#[command(name = "dni-im", author, version, about = "Peer-to-peer instant messenger core", long_about = None)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: binds the transport, starts discovery, and opens an
    /// interactive session.
    Run,
    /// Generate a new local identity and write it to the configured data
    /// directory.
    Keygen {
        /// Display name to embed in the identity.
        #[arg(long, default_value = "anonymous")]
        name: String,
    },
}

/// Bridges the synchronous `PacketSink` the Session Manager expects to the
/// async transport: sends are handed to a channel drained by a background
/// task so `SessionManager` itself stays a plain, non-async struct (§4.5).
struct ChannelSink {
    tx: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl PacketSink for ChannelSink {
    fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()> {
        self.tx
            .send((addr, bytes.to_vec()))
            .map_err(|_| std::io::Error::other("outbound task has shut down"))
    }
}

/// Everything that can drive the Session Manager forward, merged onto one
/// channel so it has a single owner (§5, §9).
enum SessionInput {
    Inbound(Packet, SocketAddr),
    Peer(PeerEndpoint),
    Command(Command, oneshot::Sender<Result<Option<SendOutcome>, String>>),
    Sweep,
    Shutdown,
}

/// Exit codes for a failed daemon startup (§6, SPEC_FULL §B.3).
const EXIT_IDENTITY_FAILURE: i32 = 1;
const EXIT_BIND_FAILURE: i32 = 2;
const EXIT_STORAGE_FAILURE: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            if let Err((code, err)) = run(cli.config).await {
                eprintln!("error: {err:#}");
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Keygen { name } => keygen(cli.config, name),
    }
}

fn default_config_path() -> PathBuf {
    dirs_data_dir().join("config.toml")
}

fn dirs_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".local/share/dni-im"))
        .unwrap_or_else(|| PathBuf::from(".dni-im"))
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    Ok(Config::load_or_default(&path)?)
}

fn keygen(config_path: Option<PathBuf>, display_name: String) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let identity_path = config.storage.data_dir.join("identity.json");

    if identity_path.exists() {
        anyhow::bail!(
            "identity already exists at {}; remove it first if you want a new one",
            identity_path.display()
        );
    }

    let identity = generate_identity(display_name)?;
    identity.save(&identity_path)?;
    println!("fingerprint: {}", identity.fingerprint);
    println!("saved to:    {}", identity_path.display());
    Ok(())
}

/// Derive a fingerprint the way the identity provider would: the first 16
/// hex characters of the BLAKE3 hash of the static public key (§3). A real
/// deployment's identity provider is out of scope; this stands in for it so
/// the CLI has something to bootstrap from.
fn generate_identity(display_name: String) -> anyhow::Result<Identity> {
    let keypair = dni_crypto::noise::StaticKeypair::generate()
        .map_err(|e| anyhow::anyhow!("generating static keypair: {e}"))?;
    let digest = dni_crypto::hash::hash(keypair.public_key());
    let fingerprint = hex::encode(&digest[..8]);
    let mut private = [0u8; 32];
    private.copy_from_slice(keypair.private_key());
    Ok(Identity::from_provider(fingerprint, display_name, private))
}

/// Runs the daemon to completion. Stage-by-stage startup failures map to
/// distinct exit codes (§6, SPEC_FULL §B.3); `main` reports them.
async fn run(config_path: Option<PathBuf>) -> Result<(), (i32, anyhow::Error)> {
    let config = load_config(config_path).map_err(|e| (EXIT_STORAGE_FAILURE, e))?;
    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.clone())
        .init();

    std::fs::create_dir_all(&config.storage.data_dir)
        .map_err(|e| (EXIT_STORAGE_FAILURE, anyhow::Error::from(e)))?;
    let identity_path = config.storage.data_dir.join("identity.json");
    let identity = if identity_path.exists() {
        Identity::load(&identity_path).map_err(|e| (EXIT_IDENTITY_FAILURE, anyhow::Error::from(e)))?
    } else {
        let identity = generate_identity("anonymous".to_string())
            .map_err(|e| (EXIT_IDENTITY_FAILURE, e))?;
        identity
            .save(&identity_path)
            .map_err(|e| (EXIT_IDENTITY_FAILURE, anyhow::Error::from(e)))?;
        tracing::info!(fingerprint = %identity.fingerprint, "generated new identity");
        identity
    };
    let local_fingerprint = identity.fingerprint.clone();
    let local_static_pub = *identity.static_keypair.public_key();

    let contacts = ContactBook::load(&config.storage.data_dir.join("contacts.json"))
        .map_err(|e| (EXIT_STORAGE_FAILURE, anyhow::Error::from(e)))?;
    let queue = MessageQueue::load(&config.storage.data_dir.join("queue.json"))
        .map_err(|e| (EXIT_STORAGE_FAILURE, anyhow::Error::from(e)))?;

    let transport = Arc::new(
        AsyncUdpTransport::bind(config.bind_addr())
            .await
            .map_err(|e| (EXIT_BIND_FAILURE, anyhow::Error::from(e)))?,
    );
    let bound_addr = transport
        .local_addr()
        .map_err(|e| (EXIT_BIND_FAILURE, anyhow::Error::from(e)))?;
    tracing::info!(addr = %bound_addr, fingerprint = %local_fingerprint, "listening");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<(SocketAddr, Vec<u8>)>();
    {
        let transport = transport.clone();
        tokio::spawn(async move {
            while let Some((addr, bytes)) = outbound_rx.recv().await {
                if let Err(e) = transport.send_to(&bytes, addr).await {
                    tracing::debug!(error = %e, %addr, "outbound send failed");
                }
            }
        });
    }

    let mut manager = SessionManager::new(identity, contacts, queue, ChannelSink { tx: outbound_tx.clone() });

    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<SessionInput>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let receive_handle = {
        let transport = transport.clone();
        let session_tx = session_tx.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                tokio::select! {
                    result = transport.recv_from(&mut buf) => {
                        match result {
                            Ok((n, source)) => {
                                if let Ok(packet) = Packet::decode(&buf[..n]) {
                                    if session_tx.send(SessionInput::Inbound(packet, source)).is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "transport recv failed");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    };

    let discovery_handle = {
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<PeerEndpoint>();
        let discovery_config = DiscoveryConfig {
            fingerprint: local_fingerprint.clone(),
            static_pub: local_static_pub,
            display_name: "anonymous".to_string(),
            udp_port: bound_addr.port(),
            use_lan_discovery: config.network.use_lan_discovery,
            relay_address: config
                .network
                .relay_address
                .map(|ip| SocketAddr::new(ip, config.network.relay_port)),
        };
        let shutdown_rx = shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = DiscoveryFabric::new(discovery_config).run(peer_tx, shutdown_rx).await {
                tracing::warn!(error = %e, "discovery fabric stopped");
            }
        });
        let session_tx = session_tx.clone();
        tokio::spawn(async move {
            while let Some(peer) = peer_rx.recv().await {
                if session_tx.send(SessionInput::Peer(peer)).is_err() {
                    break;
                }
            }
        });
        handle
    };

    let sweep_handle = {
        let session_tx = session_tx.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if session_tx.send(SessionInput::Sweep).is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    };

    {
        let session_tx = session_tx.clone();
        tokio::task::spawn_blocking(move || repl(session_tx));
    }
    drop(session_tx);

    println!("dni-im ready. fingerprint={local_fingerprint} listening on {bound_addr}");
    println!("commands: send <fingerprint> <text> | peers | add <fingerprint> <addr> <static_pub_hex> | delete <fingerprint> | quit");

    while let Some(input) = session_rx.recv().await {
        match input {
            SessionInput::Inbound(packet, source) => {
                let (events, outbound) = manager.handle_inbound(packet, source);
                for (addr, bytes) in outbound {
                    let _ = outbound_tx.send((addr, bytes));
                }
                for event in events {
                    print_event(&event);
                }
            }
            SessionInput::Peer(peer) => {
                if let Some(event) = manager.observe_peer(peer) {
                    print_event(&event);
                }
            }
            SessionInput::Command(command, reply) => {
                let result = manager
                    .handle_command(command)
                    .map(|(outcome, events)| {
                        for event in events {
                            print_event(&event);
                        }
                        outcome
                    })
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            SessionInput::Sweep => {
                for event in manager.sweep_idle() {
                    print_event(&event);
                }
                for event in manager.sweep_stale_peers() {
                    print_event(&event);
                }
            }
            SessionInput::Shutdown => break,
        }
    }

    // Graceful shutdown (SPEC_FULL §C): stop the Receive and idle-sweep
    // tasks immediately, then let the Discovery task deregister from the
    // relay (best-effort, no ack awaited) before it exits.
    let _ = shutdown_tx.send(true);
    receive_handle.abort();
    let _ = receive_handle.await;
    sweep_handle.abort();
    let _ = sweep_handle.await;
    let _ = discovery_handle.await;

    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::PeerDiscovered { fingerprint, name, source } => {
            println!("[peer discovered] {fingerprint} ({}) via {source:?}", name.as_deref().unwrap_or("?"));
        }
        Event::PeerLost(fingerprint) => println!("[peer lost] {fingerprint}"),
        Event::SessionEstablished(fingerprint) => println!("[session established] {fingerprint}"),
        Event::SessionClosed { fingerprint, reason } => {
            println!("[session closed] {fingerprint}: {reason}");
        }
        Event::MessageReceived { fingerprint, stream_id, plaintext } => {
            println!(
                "[message] {fingerprint}/{stream_id}: {}",
                String::from_utf8_lossy(plaintext)
            );
        }
        Event::PinningViolation(fingerprint) => {
            println!("[!] PINNING VIOLATION for {fingerprint} -- refusing session until re-pinned");
        }
    }
}

/// Blocking stdin loop, run on a dedicated thread. Sends parsed commands
/// into the Session task and blocks on its reply before printing the next
/// prompt (§6: the UI is out of scope, this is the minimal stand-in).
fn repl(session_tx: mpsc::UnboundedSender<SessionInput>) {
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            let _ = session_tx.send(SessionInput::Shutdown);
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                let _ = session_tx.send(SessionInput::Shutdown);
                break;
            }
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if session_tx.send(SessionInput::Command(command, reply_tx)).is_err() {
            break;
        }
        match reply_rx.blocking_recv() {
            Ok(Ok(Some(outcome))) => println!("-> {outcome:?}"),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => println!("error: {e}"),
            Err(_) => break,
        }
    }
}

fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or("empty command")?;
    match verb {
        "quit" | "exit" => Ok(None),
        "peers" => Ok(Some(Command::ListPeers)),
        "send" => {
            let fingerprint = parts.next().ok_or("usage: send <fingerprint> <text>")?.to_string();
            let text: Vec<&str> = parts.collect();
            if text.is_empty() {
                return Err("usage: send <fingerprint> <text>".to_string());
            }
            Ok(Some(Command::Send {
                fingerprint,
                stream_id: 0,
                plaintext: text.join(" ").into_bytes(),
            }))
        }
        "delete" => {
            let fingerprint = parts.next().ok_or("usage: delete <fingerprint>")?.to_string();
            Ok(Some(Command::DeletePeer(fingerprint)))
        }
        "add" => {
            let fingerprint = parts.next().ok_or("usage: add <fingerprint> <addr> <static_pub_hex>")?.to_string();
            let addr: SocketAddr = parts
                .next()
                .ok_or("usage: add <fingerprint> <addr> <static_pub_hex>")?
                .parse()
                .map_err(|e| format!("bad address: {e}"))?;
            let static_pub_hex = parts.next().ok_or("usage: add <fingerprint> <addr> <static_pub_hex>")?;
            let raw = hex::decode(static_pub_hex).map_err(|e| format!("bad static key hex: {e}"))?;
            let static_pub: [u8; 32] = raw.try_into().map_err(|_| "static key must be 32 bytes".to_string())?;
            Ok(Some(Command::AddPeerManual { fingerprint, address: addr, static_pub }))
        }
        other => Err(format!("unrecognized command: {other}")),
    }
}

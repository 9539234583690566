use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpStream;
use tracing::{debug, info, warn, Level};

use ja3tap_core::{FingerprintCache, Ja3Config, Ja3Listener, TrackedConn};

/// Pause after a failed accept so a persistent error (fd exhaustion, for one)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "ja3tap-proxy")]
#[command(about = "TCP pass-through proxy that logs the JA3 fingerprint of every TLS client")]
struct Cli {
    /// Address to accept client connections on
    #[arg(short, long, default_value = "0.0.0.0:8443")]
    listen: SocketAddr,

    /// TLS server to forward every connection to (host:port)
    #[arg(short, long)]
    upstream: String,

    /// JSON config file, e.g. {"sort_extensions": true, "sniff_timeout_ms": 5000}
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sort extensions before hashing (overrides the config file)
    #[arg(long, default_value_t = false)]
    sort_extensions: bool,

    /// Stop waiting for a ClientHello after this many milliseconds; 0 waits forever
    #[arg(long)]
    sniff_timeout_ms: Option<u64>,

    /// Log every connection, including raw JA3 strings and SNI
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = load_config(&cli)?;
    let cache = Arc::new(FingerprintCache::new());
    let mut listener = Ja3Listener::bind(cli.listen, cache.clone(), &config)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    let upstream: Arc<str> = Arc::from(cli.upstream);

    info!("ja3tap proxy listening on {}, forwarding to {}", cli.listen, upstream);
    if config.sort_extensions {
        info!("Extensions are sorted before hashing");
    }

    loop {
        // Sniffing runs on the listener's own tasks; accept only yields
        // connections that are already fingerprinted.
        let client = match listener.accept().await {
            Ok(client) => client,
            Err(e) => {
                back_off(&e).await;
                continue;
            }
        };

        let peer = client.peer_addr();
        let upstream = Arc::clone(&upstream);
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            if let Err(e) = relay(client, &upstream).await {
                warn!("[{}] {:#}", peer, e);
            }
            debug!("{} connections still fingerprinted", cache.len());
        });
    }
}

async fn back_off(e: &std::io::Error) {
    warn!("accept failed: {}, retrying in {:?}", e, ACCEPT_BACKOFF);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

fn load_config(cli: &Cli) -> Result<Ja3Config> {
    let mut config = match &cli.config {
        Some(path) => Ja3Config::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Ja3Config::default(),
    };
    if cli.sort_extensions {
        config.sort_extensions = true;
    }
    if let Some(ms) = cli.sniff_timeout_ms {
        config.sniff_timeout_ms = Some(ms);
    }
    Ok(config)
}

/// Log the client's JA3, then shuttle bytes between it and the upstream.
async fn relay(mut client: TrackedConn<TcpStream>, upstream: &str) -> Result<()> {
    let peer = client.peer_addr();
    match client.fingerprint() {
        Some(ja3) => info!("[{}] JA3 {}", peer, ja3),
        None => info!("[{}] no JA3 (not a TLS ClientHello)", peer),
    }

    let mut server = TcpStream::connect(upstream)
        .await
        .with_context(|| format!("Failed to connect to upstream {}", upstream))?;

    // The upstream reads the replayed ClientHello first, then the live stream.
    let (up, down) = tokio::io::copy_bidirectional(&mut client, &mut server)
        .await
        .context("relay failed")?;

    debug!("[{}] closed: {} bytes up, {} bytes down", peer, up, down);
    Ok(())
}

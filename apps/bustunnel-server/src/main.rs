//! BusTunnel Server - single-node HTTP-over-bus file transfer.
//!
//! Runs the HTTP front, an in-memory bus and block store, and a reverse
//! proxy consumer that forwards tunneled requests back to the front.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:5000 bustunnel-server
//! ```
//!
//! # Environment Variables
//!
//! See [`bustunnel_core::TunnelConfig::from_env`] for the full list. The
//! ones most often set:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:5000` | Bind address |
//! | `FORWARDING_HOST` | `localhost` | Where tunneled requests are replayed |
//! | `FORWARDING_PORT` | `5000` | Port tunneled requests are replayed on |
//! | `CHUNK_SIZE_BYTES` | `1048576` | Transfer chunk size |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bustunnel_bus::{InMemoryBus, MessageBus};
use bustunnel_core::TunnelConfig;
use bustunnel_http::{TunnelHttpService, authorizer_from_config, serve};
use bustunnel_proxy::{HttpForwarder, ReverseProxyConsumer};
use bustunnel_store::{BlockStore, InMemoryBlockStore};
use bustunnel_transfer::TransferService;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Check `GET /health` on `addr`. Succeeds on a 200 that reports `running`.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = TunnelConfig::from_env();

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;
    config.validate()?;

    let bus = InMemoryBus::new();
    let store: Arc<dyn BlockStore> = Arc::new(InMemoryBlockStore::new());
    let shared_bus: Arc<dyn MessageBus> = Arc::new(bus.clone());

    let transfer = Arc::new(TransferService::new(&config, Arc::clone(&shared_bus), store));
    let service = TunnelHttpService::new(transfer).with_authorizer(authorizer_from_config(&config));

    let forwarder = HttpForwarder::from_config(&config)?;
    let subscription = ReverseProxyConsumer::new(Arc::clone(&shared_bus), forwarder)
        .start(config.max_concurrent_calls)?;

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        forwarding_host = %config.forwarding_host,
        forwarding_port = config.forwarding_port,
        chunk_size = config.chunk_size,
        messages_per_send = config.messages_per_send,
        version = VERSION,
        "starting BusTunnel Server",
    );

    // The consumer forwards to this front, so it stops while the front still
    // accepts connections. The front drains once it has stopped.
    serve(listener, service, async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, stopping consumer");
        subscription.shutdown().await;
        info!("consumer stopped, draining connections");
    })
    .await;

    bus.close().await?;
    info!("bus closed");

    Ok(())
}

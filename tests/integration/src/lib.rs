//! End-to-end tests for a BusTunnel node.
//!
//! Each test boots a complete node in-process: the HTTP front on an
//! ephemeral port, an in-memory bus and block store, and a reverse proxy
//! consumer forwarding tunneled requests back to that same front.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context, Result};
use bustunnel_bus::{InMemoryBus, MessageBus, Subscription};
use bustunnel_core::TunnelConfig;
use bustunnel_http::{TunnelHttpService, authorizer_from_config, serve};
use bustunnel_proxy::{HttpForwarder, ReverseProxyConsumer};
use bustunnel_store::{BlockStore, InMemoryBlockStore};
use bustunnel_transfer::{StagingArea, TransferService};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

mod test_auth;
mod test_download;
mod test_tunnel;
mod test_upload;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// One MiB.
pub const MIB: u64 = 1024 * 1024;

/// A running single-node deployment.
#[derive(Debug)]
pub struct Node {
    addr: SocketAddr,
    /// The node's bus.
    pub bus: InMemoryBus,
    /// The node's block store.
    pub store: Arc<InMemoryBlockStore>,
    /// Scratch directory for source and destination files.
    pub dir: tempfile::TempDir,
    client: reqwest::Client,
    stop: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

impl Node {
    /// Start a node with 1 MiB chunks and a short stitch delay.
    pub async fn start() -> Result<Self> {
        Self::start_with(|config| config).await
    }

    /// Start a node whose configuration is adjusted by `tweak`. The listen
    /// address and forwarding target are always the node itself.
    pub async fn start_with(tweak: impl FnOnce(TunnelConfig) -> TunnelConfig) -> Result<Self> {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let base = TunnelConfig::builder()
            .gateway_listen(addr.to_string())
            .chunk_size(MIB)
            .messages_per_send(2)
            .max_concurrent_calls(4)
            .forwarding_host("127.0.0.1".to_owned())
            .forwarding_port(addr.port())
            .forwarding_timeout_ms(10_000)
            .stitch_delay_ms(20)
            .retry_max_retries(2)
            .retry_base_delay_ms(5)
            .build();
        let config = tweak(base);
        config.validate()?;

        let bus = InMemoryBus::new();
        let store = Arc::new(InMemoryBlockStore::new());
        let shared_bus: Arc<dyn MessageBus> = Arc::new(bus.clone());

        let transfer = TransferService::new(
            &config,
            Arc::clone(&shared_bus),
            Arc::clone(&store) as Arc<dyn BlockStore>,
        );
        let service = TunnelHttpService::new(Arc::new(transfer))
            .with_authorizer(authorizer_from_config(&config));

        let (stop_tx, stop_rx) = oneshot::channel();
        let server = tokio::spawn(serve(listener, service, async move {
            stop_rx.await.ok();
        }));

        let subscription = ReverseProxyConsumer::new(shared_bus, HttpForwarder::from_config(&config)?)
            .start(config.max_concurrent_calls)?;

        Ok(Self {
            addr,
            bus,
            store,
            dir: tempfile::tempdir()?,
            client: reqwest::Client::new(),
            stop: Some(stop_tx),
            server: Some(server),
            subscription: Some(subscription),
        })
    }

    /// Absolute path of `name` inside the scratch directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Full URL of a front endpoint with a `path` query parameter.
    #[must_use]
    pub fn url(&self, endpoint: &str, path: &Path) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("path", &path.display().to_string())
            .finish();
        format!("http://{}{endpoint}?{query}", self.addr)
    }

    /// The HTTP client used by the helpers.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `POST /api/transfer/upload` for `path`.
    pub async fn begin_upload(&self, path: &Path) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/api/transfer/upload", path))
            .send()
            .await?)
    }

    /// `GET /api/transfer/download` for `path`.
    pub async fn begin_download(&self, path: &Path) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.url("/api/transfer/download", path))
            .send()
            .await?)
    }

    /// Wait until the download into `path` has been stitched.
    pub async fn wait_for_download(&self, path: &Path) -> Result<()> {
        let staging = StagingArea::for_destination(path);
        wait_until(Duration::from_secs(30), || {
            path.exists() && !staging.dir().exists()
        })
        .await
        .with_context(|| format!("download of {} did not finish", path.display()))
    }

    /// Wait until the bus has nothing waiting and nothing in flight.
    pub async fn wait_for_idle(&self) -> Result<()> {
        wait_until(Duration::from_secs(30), || {
            self.bus.pending_count() == 0 && self.bus.in_flight_count() == 0
        })
        .await
        .context("bus did not drain")
    }

    /// Stop the consumer while the front still serves its forwards, then
    /// drain the front and close the bus.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(subscription) = self.subscription.take() {
            subscription.shutdown().await;
        }
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        if let Some(server) = self.server.take() {
            server.await?;
        }
        self.bus.close().await?;
        Ok(())
    }
}

/// Poll `done` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out after {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Deterministic test content of `len` bytes.
#[must_use]
pub fn pattern(len: u64) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).unwrap_or_default()).collect()
}

//! Message bus adapter for BusTunnel.
//!
//! The bus is consumed through [`MessageBus`]. Handlers are registered
//! explicitly and receive a [`Subscription`] back; there is no process-wide
//! handler slot. Settlement is always explicit unless
//! [`HandlerOptions::auto_complete`] is turned on.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bustunnel_core::{TunnelError, TunnelResult};
use bustunnel_model::{BusMessage, Delivery, LockToken};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use typed_builder::TypedBuilder;

pub use memory::{DeadLetter, InMemoryBus};

/// Default delivery attempts before a failing message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// Processes one delivery.
///
/// An `Err` return abandons the delivery: the bus hands the error to the
/// registered [`ErrorHandler`] and redelivers the message later.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle `delivery`.
    async fn handle(&self, delivery: Delivery) -> TunnelResult<()>;
}

/// Observes handler failures.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Called with the error a handler returned for `delivery`.
    fn on_error(&self, err: &TunnelError, delivery: &Delivery);
}

impl<F> ErrorHandler for F
where
    F: Fn(&TunnelError, &Delivery) + Send + Sync + 'static,
{
    fn on_error(&self, err: &TunnelError, delivery: &Delivery) {
        self(err, delivery);
    }
}

/// [`ErrorHandler`] that logs the failure with the lock token as correlation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn on_error(&self, err: &TunnelError, delivery: &Delivery) {
        error!(
            error_type = err.type_name(),
            correlation = %delivery.lock_token,
            delivery_count = delivery.delivery_count,
            error = %err,
            "message handler failed"
        );
    }
}

/// Options of a handler registration.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct HandlerOptions {
    /// Upper bound of concurrently running handler invocations.
    #[builder(default = 1)]
    pub max_concurrent_calls: usize,

    /// Complete a delivery automatically when the handler returns `Ok`
    /// without settling it. When off, such a delivery is abandoned and
    /// redelivered.
    #[builder(default = false)]
    pub auto_complete: bool,

    /// Deliveries after which a failing message is dead-lettered.
    #[builder(default = DEFAULT_MAX_DELIVERY_COUNT)]
    pub max_delivery_count: u32,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

// ---------------------------------------------------------------------------
// MessageBus
// ---------------------------------------------------------------------------

/// Narrow interface over a single-queue message bus.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Enqueue `messages` in order.
    async fn send_batch(&self, messages: Vec<BusMessage>) -> TunnelResult<()>;

    /// Enqueue one message.
    async fn send(&self, message: BusMessage) -> TunnelResult<()> {
        self.send_batch(vec![message]).await
    }

    /// Start delivering messages to `handler`. Must be called inside a tokio
    /// runtime.
    fn register_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
        error_handler: Arc<dyn ErrorHandler>,
        options: HandlerOptions,
    ) -> TunnelResult<Subscription>;

    /// Settle a delivery as processed.
    async fn complete(&self, token: &LockToken) -> TunnelResult<()>;

    /// Settle a delivery as unprocessable.
    async fn dead_letter(&self, token: &LockToken, reason: &str) -> TunnelResult<()>;

    /// Stop every subscription and reject further sends.
    async fn close(&self) -> TunnelResult<()>;
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live handler registration.
///
/// Dropping it without calling [`shutdown`](Self::shutdown) also stops
/// delivery, but does not wait for in-flight handlers.
#[derive(Debug)]
pub struct Subscription {
    stop: Arc<watch::Sender<bool>>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a delivery pump that exits once `stop` flips to `true`, after
    /// its in-flight handlers have finished.
    #[must_use]
    pub fn new(stop: Arc<watch::Sender<bool>>, pump: JoinHandle<()>) -> Self {
        Self {
            stop,
            pump: Some(pump),
        }
    }

    /// Stop accepting new deliveries and wait for in-flight handlers.
    pub async fn shutdown(mut self) {
        self.stop.send_replace(true);
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                warn!(error = %e, "delivery pump terminated abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

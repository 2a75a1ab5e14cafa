//! Bus subscriber that replays tunneled requests.

use std::sync::Arc;

use async_trait::async_trait;
use bustunnel_bus::{HandlerOptions, LogErrorHandler, MessageBus, MessageHandler, Subscription};
use bustunnel_core::{TunnelError, TunnelResult};
use bustunnel_model::Delivery;
use http::StatusCode;
use tracing::{error, info, warn};

use crate::forwarder::HttpForwarder;

/// Decodes, forwards, and settles one message at a time.
///
/// The consumer never completes a message whose replay did not return
/// `200`, and it never logs payload bytes; failures are correlated by the
/// delivery's lock token.
#[derive(Clone)]
pub struct ReverseProxyConsumer {
    bus: Arc<dyn MessageBus>,
    forwarder: HttpForwarder,
}

impl std::fmt::Debug for ReverseProxyConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseProxyConsumer")
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}

impl ReverseProxyConsumer {
    /// Create a consumer settling through `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, forwarder: HttpForwarder) -> Self {
        Self { bus, forwarder }
    }

    /// Register with the bus. `auto_complete` is always off: every delivery
    /// is settled explicitly.
    pub fn start(self, max_concurrent_calls: usize) -> TunnelResult<Subscription> {
        let options = HandlerOptions::builder()
            .max_concurrent_calls(max_concurrent_calls)
            .auto_complete(false)
            .build();
        let bus = Arc::clone(&self.bus);
        info!(
            host = self.forwarder.host(),
            port = self.forwarder.port(),
            max_concurrent_calls,
            "starting reverse proxy consumer"
        );
        bus.register_handler(Arc::new(self), Arc::new(LogErrorHandler), options)
    }
}

#[async_trait]
impl MessageHandler for ReverseProxyConsumer {
    async fn handle(&self, delivery: Delivery) -> TunnelResult<()> {
        let token = &delivery.lock_token;

        let request = match delivery.message.decode_request() {
            Ok(request) => request,
            Err(err) => {
                let err = TunnelError::from(err);
                error!(
                    error_type = err.type_name(),
                    correlation = %token,
                    error = %err,
                    "undecodable tunnel request, dead-lettering"
                );
                return self.bus.dead_letter(token, err.type_name()).await;
            }
        };

        let host = self.forwarder.host();
        let port = self.forwarder.port();
        match self.forwarder.forward(&request).await {
            Ok(StatusCode::OK) => {
                info!(
                    host,
                    port,
                    method = %request.method,
                    path = %request.path,
                    query = %request.query,
                    status = 200,
                    complete = true,
                    "forwarded request"
                );
                self.bus.complete(token).await
            }
            Ok(status) => {
                warn!(
                    host,
                    port,
                    method = %request.method,
                    path = %request.path,
                    query = %request.query,
                    status = status.as_u16(),
                    dead_letter = true,
                    correlation = %token,
                    "forwarded request failed"
                );
                self.bus
                    .dead_letter(token, &format!("upstream status {}", status.as_u16()))
                    .await
            }
            Err(err) => {
                error!(
                    host,
                    port,
                    method = %request.method,
                    path = %request.path,
                    query = %request.query,
                    error_type = err.kind,
                    correlation = %token,
                    dead_letter = true,
                    "forwarding failed"
                );
                self.bus.dead_letter(token, err.kind).await
            }
        }
    }
}

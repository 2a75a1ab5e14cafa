//! In-memory [`MessageBus`].
//!
//! A single FIFO queue shared by every subscription. Each subscription runs
//! a pump task that pops messages and spawns one handler task per delivery,
//! bounded by a [`Semaphore`] of `max_concurrent_calls` permits. In-flight
//! deliveries are tracked by lock token until they are settled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bustunnel_core::{TunnelError, TunnelResult};
use bustunnel_model::{BusMessage, Delivery, LockToken};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, watch};
use tracing::{debug, info, trace, warn};

use crate::{ErrorHandler, HandlerOptions, MessageBus, MessageHandler, Subscription};

/// A message removed from normal delivery.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The message.
    pub message: BusMessage,
    /// Why it was dead-lettered.
    pub reason: String,
}

#[derive(Debug, Clone)]
struct Pending {
    message: BusMessage,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct Inner {
    queue: Mutex<VecDeque<Pending>>,
    notify: Notify,
    in_flight: DashMap<LockToken, Pending>,
    completed: Mutex<Vec<BusMessage>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    subscriptions: Mutex<Vec<Arc<watch::Sender<bool>>>>,
    closed: AtomicBool,
}

/// Thread-safe in-memory message bus.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting for delivery.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Deliveries handed out but not yet settled.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Remove and return every waiting message.
    #[must_use]
    pub fn drain_pending(&self) -> Vec<BusMessage> {
        self.inner
            .queue
            .lock()
            .drain(..)
            .map(|p| p.message)
            .collect()
    }

    /// Messages settled with [`MessageBus::complete`].
    #[must_use]
    pub fn completed(&self) -> Vec<BusMessage> {
        self.inner.completed.lock().clone()
    }

    /// Messages settled with [`MessageBus::dead_letter`] or that exceeded the
    /// delivery count.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.lock().clone()
    }
}

impl Inner {
    fn take_in_flight(&self, token: &LockToken) -> TunnelResult<Pending> {
        self.in_flight
            .remove(token)
            .map(|(_, pending)| pending)
            .ok_or_else(|| TunnelError::LockLost {
                token: token.to_string(),
            })
    }

    fn push_dead_letter(&self, message: BusMessage, reason: &str) {
        self.dead_letters.lock().push(DeadLetter {
            message,
            reason: reason.to_owned(),
        });
    }

    /// Return an unsettled delivery to the queue, or dead-letter it once it
    /// has been delivered `max_delivery_count` times.
    fn abandon(&self, token: &LockToken, max_delivery_count: u32) {
        let Some((_, pending)) = self.in_flight.remove(token) else {
            return;
        };
        if pending.delivery_count >= max_delivery_count {
            warn!(
                message_id = %pending.message.message_id,
                delivery_count = pending.delivery_count,
                "max delivery count exceeded, dead-lettering"
            );
            self.push_dead_letter(pending.message, "MaxDeliveryCountExceeded");
            return;
        }
        trace!(message_id = %pending.message.message_id, "abandoning delivery");
        self.queue.lock().push_back(pending);
        self.notify.notify_waiters();
    }

    /// Wait for the next message, or `None` once `stop` is raised.
    async fn next_pending(&self, stop: &mut watch::Receiver<bool>) -> Option<Pending> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.queue.lock().pop_front();
            if let Some(pending) = next {
                return Some(pending);
            }
            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => return None,
                () = &mut notified => {}
            }
        }
    }
}

async fn pump(
    inner: Arc<Inner>,
    handler: Arc<dyn MessageHandler>,
    error_handler: Arc<dyn ErrorHandler>,
    options: HandlerOptions,
    mut stop: watch::Receiver<bool>,
) {
    let permits = options.max_concurrent_calls.max(1);
    let semaphore = Arc::new(Semaphore::new(permits));

    loop {
        let permit = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let Some(mut pending) = inner.next_pending(&mut stop).await else {
            break;
        };

        pending.delivery_count += 1;
        let token = LockToken::generate();
        let delivery = Delivery {
            message: pending.message.clone(),
            lock_token: token.clone(),
            delivery_count: pending.delivery_count,
        };
        inner.in_flight.insert(token.clone(), pending);

        let inner = Arc::clone(&inner);
        let handler = Arc::clone(&handler);
        let error_handler = Arc::clone(&error_handler);
        tokio::spawn(async move {
            let _permit = permit;
            match handler.handle(delivery.clone()).await {
                Ok(()) if options.auto_complete => {
                    if let Ok(pending) = inner.take_in_flight(&token) {
                        inner.completed.lock().push(pending.message);
                    }
                }
                // A handler that returned without settling releases its lock.
                Ok(()) => inner.abandon(&token, options.max_delivery_count),
                Err(err) => {
                    error_handler.on_error(&err, &delivery);
                    inner.abandon(&token, options.max_delivery_count);
                }
            }
        });
    }

    // Every permit back means every handler has returned.
    let all = u32::try_from(permits).unwrap_or(u32::MAX);
    if semaphore.acquire_many(all).await.is_err() {
        warn!("handler semaphore closed during shutdown");
    }
    debug!("delivery pump stopped");
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn send_batch(&self, messages: Vec<BusMessage>) -> TunnelResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TunnelError::remote("send_batch", "bus is closed"));
        }
        let now = Utc::now();
        let count = messages.len();
        {
            let mut queue = self.inner.queue.lock();
            for mut message in messages {
                message.enqueued_at = Some(now);
                queue.push_back(Pending {
                    message,
                    delivery_count: 0,
                });
            }
        }
        self.inner.notify.notify_waiters();
        trace!(count, "enqueued messages");
        Ok(())
    }

    fn register_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
        error_handler: Arc<dyn ErrorHandler>,
        options: HandlerOptions,
    ) -> TunnelResult<Subscription> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TunnelError::remote("register_handler", "bus is closed"));
        }
        let (stop, stop_rx) = watch::channel(false);
        let stop = Arc::new(stop);
        self.inner.subscriptions.lock().push(Arc::clone(&stop));

        info!(
            max_concurrent_calls = options.max_concurrent_calls,
            auto_complete = options.auto_complete,
            "registering message handler"
        );
        let task = tokio::spawn(pump(
            Arc::clone(&self.inner),
            handler,
            error_handler,
            options,
            stop_rx,
        ));
        Ok(Subscription::new(stop, task))
    }

    async fn complete(&self, token: &LockToken) -> TunnelResult<()> {
        let pending = self.inner.take_in_flight(token)?;
        trace!(message_id = %pending.message.message_id, "message completed");
        self.inner.completed.lock().push(pending.message);
        Ok(())
    }

    async fn dead_letter(&self, token: &LockToken, reason: &str) -> TunnelResult<()> {
        let pending = self.inner.take_in_flight(token)?;
        debug!(message_id = %pending.message.message_id, reason, "message dead-lettered");
        self.inner.push_dead_letter(pending.message, reason);
        Ok(())
    }

    async fn close(&self) -> TunnelResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        for stop in self.inner.subscriptions.lock().drain(..) {
            stop.send_replace(true);
        }
        info!("message bus closed");
        Ok(())
    }
}

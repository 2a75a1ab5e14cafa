//! Bounded exponential-backoff retry policies.
//!
//! Two flavours share the same backoff math (`base × 2^attempt`) and differ
//! only in what they retry:
//!
//! - [`RetryClass::Remote`]: block store and bus calls. Every error is
//!   retried; after the last retry the original error propagates.
//! - [`RetryClass::LocalResource`]: filesystem checks and opens. Every error
//!   except [`ErrorKind::Forbidden`] is retried. Permission failures are not
//!   transient and propagate immediately.
//!
//! Callers pick the policy by the class of call they make, never by
//! inspecting the error afterwards.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::error::{ErrorKind, TunnelError};

/// Which class of operation a [`RetryPolicy`] guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Block store and bus calls.
    Remote,
    /// Filesystem checks, opens, appends and deletes.
    LocalResource,
}

impl RetryClass {
    /// Whether an error of this class should be retried.
    #[must_use]
    pub fn should_retry(self, err: &TunnelError) -> bool {
        match self {
            Self::Remote => true,
            Self::LocalResource => err.kind() != ErrorKind::Forbidden,
        }
    }
}

/// A bounded retry policy with exponential backoff.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bustunnel_core::RetryPolicy;
///
/// let policy = RetryPolicy::remote(3, Duration::from_millis(500));
/// let delays: Vec<_> = policy.delays().collect();
/// assert_eq!(
///     delays,
///     vec![
///         Duration::from_millis(500),
///         Duration::from_millis(1000),
///         Duration::from_millis(2000),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    class: RetryClass,
    max_retries: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Policy for block store and bus calls.
    #[must_use]
    pub fn remote(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            class: RetryClass::Remote,
            max_retries,
            base_delay,
        }
    }

    /// Policy for filesystem checks and opens.
    #[must_use]
    pub fn local(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            class: RetryClass::LocalResource,
            max_retries,
            base_delay,
        }
    }

    /// The class this policy guards.
    #[must_use]
    pub fn class(&self) -> RetryClass {
        self.class
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// The delay schedule: `base × 2^attempt` for each retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let base = self.base_delay;
        (0..self.max_retries).map(move |attempt| {
            let factor = 2_u32.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
            base.checked_mul(factor).unwrap_or(Duration::MAX)
        })
    }

    /// Run `action` under this policy.
    ///
    /// `operation` names the call in log lines.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut action: F) -> Result<T, TunnelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TunnelError>>,
    {
        let class = self.class;
        let max_retries = self.max_retries;
        let attempts = AtomicUsize::new(0);

        let result = RetryIf::spawn(
            self.delays(),
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                action()
            },
            |err: &TunnelError| {
                let attempt = attempts.load(Ordering::Relaxed);
                let retry = class.should_retry(err);
                if retry && attempt <= max_retries {
                    warn!(
                        operation,
                        attempt,
                        max_retries,
                        error = %err,
                        "operation failed, backing off"
                    );
                }
                retry
            },
        )
        .await;

        if let Err(err) = &result {
            debug!(
                operation,
                attempts = attempts.load(Ordering::Relaxed),
                kind = %err.kind(),
                "giving up"
            );
        }
        result
    }
}

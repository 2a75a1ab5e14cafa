//! Core configuration, error taxonomy, and retry policies for BusTunnel.
//!
//! This crate provides the building blocks shared by every BusTunnel
//! component: the environment-driven [`TunnelConfig`], the [`TunnelError`]
//! taxonomy that the HTTP layer maps to not-found / forbidden / conflict
//! outcomes, and the two bounded [`RetryPolicy`] flavours used for remote
//! (block store, bus) and local (filesystem) operations.

mod config;
mod error;
mod retry;

pub use config::TunnelConfig;
pub use error::{ErrorKind, TunnelError, TunnelResult};
pub use retry::{RetryClass, RetryPolicy};

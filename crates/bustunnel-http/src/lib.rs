//! HTTP front for BusTunnel.
//!
//! A thin hyper layer in front of [`bustunnel_transfer::TransferService`]:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `POST` | `/api/transfer/upload?path=` | `begin_upload` |
//! | `GET` | `/api/transfer/download?path=` | `begin_download` |
//! | `POST` | `/api/filechunk?path=&startIndex=&length=` | `receive_upload_chunk` |
//! | `GET` | `/api/filechunk?path=&startIndex=&length=` | `receive_download_chunk` |
//! | `GET` | `/api/filestitch?path=&length=&bytesPerChunk=` | `stitch` |
//! | `GET` | `/health` | health check |
//!
//! Every request except the health check passes the configured
//! [`Authorizer`] first.

pub mod auth;
pub mod response;
pub mod router;
pub mod server;
pub mod service;

pub use auth::{AllowAll, Authorizer, RequireAuthorizationHeader, authorizer_from_config};
pub use server::serve;
pub use service::TunnelHttpService;

/// Response body of every route.
pub type TunnelBody = http_body_util::Full<bytes::Bytes>;

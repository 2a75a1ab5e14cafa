//! Hyper `Service` in front of the transfer operations.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bustunnel_core::{TunnelError, TunnelResult};
use bustunnel_model::{ChunkQuery, StitchQuery};
use bustunnel_transfer::{StitchOutcome, TransferService};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tracing::{debug, warn};

use crate::TunnelBody;
use crate::auth::{AllowAll, Authorizer};
use crate::response::{error_to_response, json_response, plain_error};
use crate::router::{Route, RouteError, resolve};

/// Version reported by the health check.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Routes front and tunneled requests to a [`TransferService`].
pub struct TunnelHttpService {
    transfer: Arc<TransferService>,
    authorizer: Arc<dyn Authorizer>,
}

impl TunnelHttpService {
    /// Serve `transfer`, letting every request through.
    #[must_use]
    pub fn new(transfer: Arc<TransferService>) -> Self {
        Self {
            transfer,
            authorizer: Arc::new(AllowAll),
        }
    }

    /// Replace the authorization interceptor.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }
}

impl Clone for TunnelHttpService {
    fn clone(&self) -> Self {
        Self {
            transfer: Arc::clone(&self.transfer),
            authorizer: Arc::clone(&self.authorizer),
        }
    }
}

impl std::fmt::Debug for TunnelHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelHttpService")
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

impl hyper::service::Service<http::Request<Incoming>> for TunnelHttpService {
    type Response = http::Response<TunnelBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        let request_id = uuid::Uuid::new_v4().to_string();

        Box::pin(async move {
            let (parts, incoming) = req.into_parts();
            let body = match incoming.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(request_id, error = %e, "failed to read request body");
                    return Ok(plain_error(
                        StatusCode::BAD_REQUEST,
                        "InvalidRequest",
                        &format!("failed to read request body: {e}"),
                        &request_id,
                    ));
                }
            };
            Ok(service.process(&parts, body, &request_id).await)
        })
    }
}

impl TunnelHttpService {
    /// Route and execute one request with an already collected body.
    pub async fn process(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
        request_id: &str,
    ) -> http::Response<TunnelBody> {
        let route = match resolve(&parts.method, parts.uri.path()) {
            Ok(route) => route,
            Err(RouteError::NotFound) => {
                return plain_error(StatusCode::NOT_FOUND, "NotFound", "no such route", request_id);
            }
            Err(RouteError::MethodNotAllowed) => {
                return plain_error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "MethodNotAllowed",
                    &format!("{} is not allowed on {}", parts.method, parts.uri.path()),
                    request_id,
                );
            }
        };

        if route == Route::Health {
            let json = serde_json::json!({ "status": "running", "version": VERSION });
            return json_response(StatusCode::OK, &json, request_id);
        }

        if !self.authorizer.authorize(&parts.headers) {
            return plain_error(
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "authorization required",
                request_id,
            );
        }

        let query = parts.uri.query().unwrap_or_default();
        let headers = header_pairs(&parts.headers);
        debug!(request_id, ?route, query, "dispatching request");

        match self.dispatch(route, query, &headers, body).await {
            Ok((status, json)) => json_response(status, &json, request_id),
            Err(err) => {
                warn!(
                    request_id,
                    ?route,
                    error_type = err.type_name(),
                    error = %err,
                    "request failed"
                );
                error_to_response(&err, request_id)
            }
        }
    }

    async fn dispatch(
        &self,
        route: Route,
        query: &str,
        headers: &[(String, String)],
        body: Bytes,
    ) -> TunnelResult<(StatusCode, serde_json::Value)> {
        match route {
            Route::Health => Ok((StatusCode::OK, serde_json::json!({ "status": "running" }))),
            Route::BeginUpload => {
                let path = path_param(query)?;
                let report = self.transfer.begin_upload(&path, headers).await?;
                Ok((
                    StatusCode::ACCEPTED,
                    serde_json::json!({
                        "path": path,
                        "chunks": report.chunks,
                        "batches": report.batches,
                    }),
                ))
            }
            Route::BeginDownload => {
                let path = path_param(query)?;
                let report = self.transfer.begin_download(&path, headers).await?;
                Ok((
                    StatusCode::ACCEPTED,
                    serde_json::json!({
                        "path": path,
                        "chunks": report.chunks,
                        "batches": report.batches,
                    }),
                ))
            }
            Route::UploadChunk => {
                let chunk = ChunkQuery::from_query(query)?;
                let id = self.transfer.receive_upload_chunk(&chunk, body).await?;
                Ok((StatusCode::OK, serde_json::json!({ "blockId": id.to_string() })))
            }
            Route::DownloadChunk => {
                let chunk = ChunkQuery::from_query(query)?;
                let written = self.transfer.receive_download_chunk(&chunk).await?;
                Ok((StatusCode::OK, serde_json::json!({ "bytes": written })))
            }
            Route::Stitch => {
                let stitch = StitchQuery::from_query(query)?;
                let outcome = self.transfer.stitch(&stitch, headers).await?;
                Ok((StatusCode::OK, outcome_json(outcome)))
            }
        }
    }
}

fn outcome_json(outcome: StitchOutcome) -> serde_json::Value {
    match outcome {
        StitchOutcome::Complete => serde_json::json!({ "outcome": "complete" }),
        StitchOutcome::Waiting { next_index } => {
            serde_json::json!({ "outcome": "waiting", "index": next_index })
        }
        StitchOutcome::Appended { index } => {
            serde_json::json!({ "outcome": "appended", "index": index })
        }
    }
}

/// The non-empty `path` query parameter.
fn path_param(query: &str) -> TunnelResult<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "path")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TunnelError::InvalidRequest("missing query parameter path".to_owned()))
}

/// Header pairs in arrival order. Values that are not valid UTF-8 are skipped.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect()
}

//! Tunnel messages of the transfer protocol.
//!
//! | Message | Request |
//! |---------|---------|
//! | upload chunk | `POST /api/filechunk?path&startIndex&length`, body = chunk bytes |
//! | download chunk | `GET /api/filechunk?path&startIndex&length` |
//! | stitch | `GET /api/filestitch?path&length&bytesPerChunk` |
//!
//! The caller's headers ride along twice: as tunnel request headers, so the
//! receiving endpoint sees the original credentials, and as bus message
//! properties.

use bustunnel_core::TunnelResult;
use bustunnel_model::{
    BusMessage, ChunkDescriptor, ChunkQuery, HttpMethod, StitchQuery, TransferJob, TunnelRequest,
};
use bytes::Bytes;

/// Path of the chunk endpoint.
pub const CHUNK_PATH: &str = "/api/filechunk";

/// Path of the stitch endpoint.
pub const STITCH_PATH: &str = "/api/filestitch";

/// Host of every transfer tunnel request. The consumer decides the real
/// upstream.
pub const TUNNEL_HOST: &str = "/";

/// Header carrying the transfer-wide correlation id.
pub const CORRELATION_HEADER: &str = "x-bustunnel-correlation";

/// Headers that describe the original connection or body rather than the
/// caller, and must not be replayed.
const HOP_HEADERS: [&str; 5] = [
    "host",
    "content-length",
    "content-type",
    "connection",
    "transfer-encoding",
];

/// The subset of `headers` worth replaying on a tunneled request.
#[must_use]
pub fn forwardable_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(k, _)| !HOP_HEADERS.iter().any(|h| k.eq_ignore_ascii_case(h)))
        .cloned()
        .collect()
}

/// The correlation id in `headers`, if any.
#[must_use]
pub fn correlation(headers: &[(String, String)]) -> Option<&str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(CORRELATION_HEADER))
        .map(|(_, v)| v.as_str())
}

/// `headers` with a fresh correlation id appended unless one is present.
#[must_use]
pub fn with_correlation(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut headers = headers.to_vec();
    if correlation(&headers).is_none() {
        headers.push((
            CORRELATION_HEADER.to_owned(),
            uuid::Uuid::new_v4().to_string(),
        ));
    }
    headers
}

fn wrap(request: &TunnelRequest, headers: &[(String, String)]) -> TunnelResult<BusMessage> {
    Ok(BusMessage::for_request(request, forwardable_headers(headers))?)
}

/// Tunneled upload of `chunk` carrying its bytes.
pub fn upload_chunk_message(
    job: &TransferJob,
    chunk: &ChunkDescriptor,
    body: Bytes,
    headers: &[(String, String)],
) -> TunnelResult<BusMessage> {
    let request = TunnelRequest::builder()
        .host(TUNNEL_HOST)
        .method(HttpMethod::Post)
        .path(CHUNK_PATH)
        .query_pairs(ChunkQuery::for_chunk(job, chunk).to_pairs())
        .headers(forwardable_headers(headers))
        .header("content-type", "application/octet-stream")
        .body(body)
        .build()?;
    Ok(wrap(&request, headers)?.with_sequence_key(chunk.block_id().to_string()))
}

/// Tunneled download request for `chunk`.
pub fn download_chunk_message(
    job: &TransferJob,
    chunk: &ChunkDescriptor,
    headers: &[(String, String)],
) -> TunnelResult<BusMessage> {
    let request = TunnelRequest::builder()
        .host(TUNNEL_HOST)
        .method(HttpMethod::Get)
        .path(CHUNK_PATH)
        .query_pairs(ChunkQuery::for_chunk(job, chunk).to_pairs())
        .headers(forwardable_headers(headers))
        .build()?;
    Ok(wrap(&request, headers)?.with_sequence_key(chunk.block_id().to_string()))
}

/// Tunneled stitch trigger.
pub fn stitch_message(query: &StitchQuery, headers: &[(String, String)]) -> TunnelResult<BusMessage> {
    let request = TunnelRequest::builder()
        .host(TUNNEL_HOST)
        .method(HttpMethod::Get)
        .path(STITCH_PATH)
        .query_pairs(query.to_pairs())
        .headers(forwardable_headers(headers))
        .build()?;
    wrap(&request, headers)
}

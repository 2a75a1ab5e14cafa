//! Path and method routing.

use http::Method;

/// A resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET /health`
    Health,
    /// `POST /api/transfer/upload`
    BeginUpload,
    /// `GET /api/transfer/download`
    BeginDownload,
    /// `POST /api/filechunk`
    UploadChunk,
    /// `GET /api/filechunk`
    DownloadChunk,
    /// `GET /api/filestitch`
    Stitch,
}

/// Why a request could not be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Unknown path.
    NotFound,
    /// Known path, wrong method.
    MethodNotAllowed,
}

/// Resolve `method` and `path` to a [`Route`].
pub fn resolve(method: &Method, path: &str) -> Result<Route, RouteError> {
    let path = path.trim_end_matches('/');
    let (get, post) = match path {
        "/health" | "/_health" => (Some(Route::Health), None),
        "/api/transfer/upload" => (None, Some(Route::BeginUpload)),
        "/api/transfer/download" => (Some(Route::BeginDownload), None),
        "/api/filechunk" => (Some(Route::DownloadChunk), Some(Route::UploadChunk)),
        "/api/filestitch" => (Some(Route::Stitch), None),
        _ => return Err(RouteError::NotFound),
    };
    let route = if method == Method::GET {
        get
    } else if method == Method::POST {
        post
    } else {
        None
    };
    route.ok_or(RouteError::MethodNotAllowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_route_chunk_endpoint_by_method() {
        assert_eq!(resolve(&Method::GET, "/api/filechunk"), Ok(Route::DownloadChunk));
        assert_eq!(resolve(&Method::POST, "/api/filechunk/"), Ok(Route::UploadChunk));
        assert_eq!(resolve(&Method::GET, "/api/filestitch"), Ok(Route::Stitch));
    }

    #[test]
    fn test_should_reject_unknown_routes() {
        assert_eq!(resolve(&Method::GET, "/api/other"), Err(RouteError::NotFound));
        assert_eq!(
            resolve(&Method::GET, "/api/transfer/upload"),
            Err(RouteError::MethodNotAllowed)
        );
        assert_eq!(
            resolve(&Method::DELETE, "/api/filechunk"),
            Err(RouteError::MethodNotAllowed)
        );
    }
}

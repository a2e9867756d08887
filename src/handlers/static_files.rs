//! Static file serving backed by tower-http's ServeDir.
//!
//! Directory listings are refused (no index fallback), and any 4xx/5xx the
//! file service produces is buffered and re-raised as an [`HttpError`] so
//! the error pipeline owns the response body.
use std::fmt;

use async_trait::async_trait;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, Response, Uri};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::core::{
    HttpError,
    handler::{Handler, HandlerResult, collect_body},
};

/// Error carrying the buffered body of a failed file response.
#[derive(Debug)]
struct ServeFailure {
    status: u16,
    detail: String,
}

impl fmt::Display for ServeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "file service returned {}", self.status)
        } else {
            write!(f, "file service returned {}: {}", self.status, self.detail)
        }
    }
}

impl std::error::Error for ServeFailure {}

pub struct StaticFileHandler {
    root: String,
    /// Prefix removed from the request path before the filesystem lookup.
    strip_prefix: String,
}

impl StaticFileHandler {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            strip_prefix: String::new(),
        }
    }

    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = prefix.into();
        self
    }

    fn rewrite_uri(&self, req: &Request<Body>) -> Result<Uri, HttpError> {
        let path = req.uri().path();
        let path = path.strip_prefix(self.strip_prefix.as_str()).unwrap_or(path);
        let uri = format!("/{}", path.trim_start_matches('/'));
        uri.parse::<Uri>()
            .map_err(|e| HttpError::new(e, 400))
    }
}

#[async_trait]
impl Handler for StaticFileHandler {
    async fn handle(&self, req: Request<Body>) -> HandlerResult {
        let uri = self.rewrite_uri(&req)?;
        let (mut parts, body) = req.into_parts();
        parts.uri = uri;
        let req = Request::from_parts(parts, body);

        let service = ServeDir::new(&self.root).append_index_html_on_directories(false);
        let response = service
            .oneshot(req)
            .await
            .map_err(|e| HttpError::new(std::io::Error::other(e.to_string()), 500))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let (_, tower_body) = response.into_parts();
            let body = Body::new(tower_body.map_err(axum::Error::new));
            let buffered = collect_body(body).await.unwrap_or_default();
            let detail = String::from_utf8_lossy(&buffered).into_owned();
            return Err(HttpError::new(
                ServeFailure {
                    status: status.as_u16(),
                    detail,
                },
                status.as_u16(),
            ));
        }

        let (parts, tower_body) = response.into_parts();
        Ok(Response::from_parts(
            parts,
            Body::new(tower_body.map_err(axum::Error::new)),
        ))
    }
}

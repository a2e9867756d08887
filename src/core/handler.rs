//! Handler and middleware capability traits.
//!
//! A [`Handler`] produces a response for a request; a [`Middleware`] wraps a
//! handler, running before (and after) it. Middleware short-circuit by
//! returning a response without invoking `next`, and report failures by
//! returning an [`HttpError`] that the nearest error handler renders.
//!
//! [`Tripperware`] is the symmetric construct over the client-side
//! round-tripper capability.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::Method;
use http_body_util::BodyExt;
use hyper::{Request, Response};

use crate::core::error::{ERR_BAD_REQUEST, ERR_ENTITY_TOO_LARGE, HttpError};

/// Result of serving a request. `Err` hands ownership of the response to an
/// error handler; middleware must not write a partial response first.
pub type HandlerResult = Result<Response<Body>, HttpError>;

/// Server-side request handler capability.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request<Body>) -> HandlerResult;

    /// Path patterns this handler serves. Used by the router for dispatch.
    fn patterns(&self) -> Vec<String> {
        Vec::new()
    }

    /// HTTP methods this handler serves. Empty means all methods.
    fn methods(&self) -> Vec<Method> {
        Vec::new()
    }
}

/// Request-processing concern that wraps a handler.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult;
}

/// Client-side request sender capability.
#[async_trait]
pub trait RoundTripper: Send + Sync + 'static {
    async fn round_trip(&self, req: Request<Body>) -> HandlerResult;
}

/// Concern that wraps a round tripper, mirroring [`Middleware`].
#[async_trait]
pub trait Tripperware: Send + Sync + 'static {
    async fn round_trip(&self, req: Request<Body>, next: Arc<dyn RoundTripper>) -> HandlerResult;
}

/// Marker error injected by the streaming body cap once a request body
/// exceeds its limit. Any body collect that hits it maps to 413.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodySizeExceeded {
    pub limit: i64,
}

impl fmt::Display for BodySizeExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request body exceeded {} bytes", self.limit)
    }
}

impl std::error::Error for BodySizeExceeded {}

/// Collect a request body into memory, translating the streaming-cap marker
/// into the 413 sentinel and any other read failure into 400.
pub async fn collect_body(body: Body) -> Result<Bytes, HttpError> {
    match body.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => {
            if find_size_exceeded(&err) {
                Err(ERR_ENTITY_TOO_LARGE.clone())
            } else {
                Err(HttpError::new(err, ERR_BAD_REQUEST.status()))
            }
        }
    }
}

fn find_size_exceeded(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<BodySizeExceeded>() {
            return true;
        }
        source = e.source();
    }
    false
}

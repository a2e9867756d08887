//! Authentication aggregator.
//!
//! Multiple scheme handlers (Basic, Digest, ...) can guard one chain. They
//! run in configured order until one succeeds, one demands an immediate
//! return (a challenge), or one fails hard; if every handler skips, the
//! aggregator fails with the unauthorized sentinel. At most one downstream
//! handler runs per request.
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{header, request::Parts};
use hyper::Request;

use crate::core::{
    Claims, HttpError,
    error::ERR_UNAUTHORIZED,
    handler::{Handler, HandlerResult, Middleware},
};

/// Outcome of one scheme handler's attempt.
pub enum AuthResult {
    /// Authentication succeeded; publish claims and continue the chain.
    Succeeded {
        claims: Claims,
        /// Strip the `Authorization` header before invoking the next handler.
        strip_authorization: bool,
    },
    /// Respond immediately, typically a 401 carrying a challenge.
    Challenge(HttpError),
    /// This request is not for this scheme; try the next handler.
    Skip,
    /// Hard failure; no re-challenge.
    Failed(HttpError),
}

/// One authentication scheme. Schemes see the request head only; the body
/// stays untouched for the downstream handler.
#[async_trait]
pub trait AuthHandler: Send + Sync + 'static {
    async fn authenticate(&self, parts: &Parts) -> AuthResult;
}

/// Middleware running scheme handlers in order.
pub struct AuthnMiddleware {
    handlers: Vec<Arc<dyn AuthHandler>>,
}

impl AuthnMiddleware {
    pub fn new(handlers: Vec<Arc<dyn AuthHandler>>) -> Self {
        Self { handlers }
    }

    pub fn single(handler: Arc<dyn AuthHandler>) -> Self {
        Self::new(vec![handler])
    }
}

#[async_trait]
impl Middleware for AuthnMiddleware {
    async fn handle(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
        let (mut parts, body) = req.into_parts();
        for handler in &self.handlers {
            match handler.authenticate(&parts).await {
                AuthResult::Succeeded {
                    claims,
                    strip_authorization,
                } => {
                    metrics::counter!(crate::metrics::PORTICO_AUTH_SUCCESS_TOTAL, "method" => claims.method.clone())
                        .increment(1);
                    parts.extensions.insert(claims);
                    if strip_authorization {
                        parts.headers.remove(header::AUTHORIZATION);
                    }
                    return next.handle(Request::from_parts(parts, body)).await;
                }
                AuthResult::Challenge(err) => return Err(err),
                AuthResult::Failed(err) => {
                    metrics::counter!(crate::metrics::PORTICO_AUTH_FAILURE_TOTAL).increment(1);
                    return Err(err);
                }
                AuthResult::Skip => continue,
            }
        }
        Err(ERR_UNAUTHORIZED.clone())
    }
}

//! Cross-origin resource sharing enforcement.
//!
//! Header semantics follow the Fetch living standard
//! (<https://fetch.spec.whatwg.org/#http-cors-protocol>). Preflight probes
//! (`OPTIONS` with `Access-Control-Request-Method`) are answered locally
//! without invoking the downstream handler; actual requests pass through and
//! have the CORS response headers appended on the way out.
//!
//! Disallowed origins get a bare 403 rather than a 200 without allow
//! headers, so the policy configuration is not leaked to outsiders.
use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderValue, Method, StatusCode, header};
use hyper::{Request, Response};

use crate::core::{
    HttpError,
    error::ERR_FORBIDDEN,
    handler::{Handler, HandlerResult, Middleware},
};

const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
const EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
const MAX_AGE: &str = "Access-Control-Max-Age";
const REQUEST_METHOD: &str = "Access-Control-Request-Method";
const REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
const REQUEST_PRIVATE_NETWORK: &str = "Access-Control-Request-Private-Network";
const ALLOW_PRIVATE_NETWORK: &str = "Access-Control-Allow-Private-Network";
const EMBEDDER_POLICY: &str = "Cross-Origin-Embedder-Policy";
const OPENER_POLICY: &str = "Cross-Origin-Opener-Policy";
const RESOURCE_POLICY: &str = "Cross-Origin-Resource-Policy";

/// Immutable cross-origin policy. Built once at configuration time.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allowed_methods: HashSet<Method>,
    methods_joined: String,
    allowed_headers_joined: String,
    exposed_headers_joined: String,
    allow_credentials: bool,
    max_age: String,
    embedder_policy: String,
    opener_policy: String,
    resource_policy: String,
    allow_private_network: bool,
    disable_wildcard_origin: bool,
}

impl CorsPolicy {
    pub fn new(origins: Vec<String>, methods: Vec<Method>) -> Self {
        let methods_joined = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            allowed_origins: origins,
            allowed_methods: methods.into_iter().collect(),
            methods_joined,
            ..Self::default()
        }
    }

    pub fn allowed_headers(mut self, joined: impl Into<String>) -> Self {
        self.allowed_headers_joined = joined.into();
        self
    }

    pub fn exposed_headers(mut self, joined: impl Into<String>) -> Self {
        self.exposed_headers_joined = joined.into();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, value: impl Into<String>) -> Self {
        self.max_age = value.into();
        self
    }

    pub fn embedder_policy(mut self, value: impl Into<String>) -> Self {
        self.embedder_policy = value.into();
        self
    }

    pub fn opener_policy(mut self, value: impl Into<String>) -> Self {
        self.opener_policy = value.into();
        self
    }

    pub fn resource_policy(mut self, value: impl Into<String>) -> Self {
        self.resource_policy = value.into();
        self
    }

    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.allow_private_network = allow;
        self
    }

    /// When set, a wildcard entry echoes the request origin back instead of
    /// emitting a literal `*`.
    pub fn disable_wildcard_origin(mut self, disable: bool) -> Self {
        self.disable_wildcard_origin = disable;
        self
    }

    /// Resolve the `Access-Control-Allow-Origin` value for a request origin,
    /// or `None` when the origin is not allowed.
    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if origin.is_empty() {
            return None;
        }
        if self.allowed_origins.iter().any(|o| o == origin) {
            return Some(origin.to_string());
        }
        if self.allowed_origins.iter().any(|o| o == "*") {
            if self.disable_wildcard_origin {
                return Some(origin.to_string());
            }
            return Some("*".to_string());
        }
        None
    }
}

/// CORS policy middleware.
pub struct CorsMiddleware {
    policy: CorsPolicy,
}

impl CorsMiddleware {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }

    fn is_preflight(req: &Request<Body>) -> bool {
        req.method() == Method::OPTIONS
            && req
                .headers()
                .get(REQUEST_METHOD)
                .is_some_and(|v| !v.is_empty())
    }

    fn preflight(&self, req: &Request<Body>) -> HandlerResult {
        let mut res = Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .map_err(|e| HttpError::new(e, 500))?;
        let headers = res.headers_mut();

        append_vary(headers, "Origin");
        append_vary(headers, REQUEST_METHOD);
        append_vary(headers, REQUEST_HEADERS);

        set_str(headers, ALLOW_METHODS, &self.policy.methods_joined);
        if req.headers().contains_key(REQUEST_HEADERS) {
            set_str(headers, ALLOW_HEADERS, &self.policy.allowed_headers_joined);
        }
        if !self.policy.exposed_headers_joined.is_empty() {
            set_str(headers, EXPOSE_HEADERS, &self.policy.exposed_headers_joined);
        }
        if !self.policy.max_age.is_empty() {
            set_str(headers, MAX_AGE, &self.policy.max_age);
        }
        if req.headers().contains_key(REQUEST_PRIVATE_NETWORK) {
            append_vary(headers, REQUEST_PRIVATE_NETWORK);
            if self.policy.allow_private_network {
                set_str(headers, ALLOW_PRIVATE_NETWORK, "true");
            }
        }

        let origin = header_str(req, header::ORIGIN);
        let Some(allow_origin) = self.policy.resolve_origin(origin) else {
            return Err(ERR_FORBIDDEN.clone());
        };
        set_str(headers, ALLOW_ORIGIN, &allow_origin);
        if self.policy.allow_credentials && allow_origin != "*" {
            set_str(headers, ALLOW_CREDENTIALS, "true");
        }
        Ok(res)
    }

    async fn actual(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
        let origin = header_str(&req, header::ORIGIN).to_string();
        let Some(allow_origin) = self.policy.resolve_origin(&origin) else {
            return Err(ERR_FORBIDDEN.clone());
        };
        if !self.policy.allowed_methods.contains(req.method()) {
            return Err(ERR_FORBIDDEN.clone());
        }

        let mut res = next.handle(req).await?;
        let headers = res.headers_mut();

        append_vary(headers, "Origin");
        set_str(headers, ALLOW_ORIGIN, &allow_origin);
        set_str(headers, ALLOW_METHODS, &self.policy.methods_joined);
        if !self.policy.allowed_headers_joined.is_empty() {
            set_str(headers, ALLOW_HEADERS, &self.policy.allowed_headers_joined);
        }
        if !self.policy.exposed_headers_joined.is_empty() {
            set_str(headers, EXPOSE_HEADERS, &self.policy.exposed_headers_joined);
        }
        if self.policy.allow_credentials && allow_origin != "*" {
            set_str(headers, ALLOW_CREDENTIALS, "true");
        }
        if !self.policy.embedder_policy.is_empty() {
            set_str(headers, EMBEDDER_POLICY, &self.policy.embedder_policy);
        }
        if !self.policy.opener_policy.is_empty() {
            set_str(headers, OPENER_POLICY, &self.policy.opener_policy);
        }
        if !self.policy.resource_policy.is_empty() {
            set_str(headers, RESOURCE_POLICY, &self.policy.resource_policy);
        }
        Ok(res)
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
        if Self::is_preflight(&req) {
            self.preflight(&req)
        } else {
            self.actual(req, next).await
        }
    }
}

fn header_str<'a>(req: &'a Request<Body>, name: header::HeaderName) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn append_vary(headers: &mut http::HeaderMap, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.append(header::VARY, v);
    }
}

fn set_str(headers: &mut http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(name, v);
    }
}

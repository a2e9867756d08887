//! Plain-text request reflector, useful behind a chain under test.
use std::fmt::Write as _;

use async_trait::async_trait;
use axum::body::Body;
use http::header;
use hyper::{Request, Response};

use crate::core::{
    HttpError,
    handler::{Handler, HandlerResult},
};

#[derive(Debug, Default, Clone)]
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, req: Request<Body>) -> HandlerResult {
        let mut out = String::new();
        let _ = writeln!(out, "method: {}", req.method());
        let _ = writeln!(out, "path: {}", req.uri().path());
        let _ = writeln!(out, "query: {}", req.uri().query().unwrap_or_default());
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let _ = writeln!(out, "host: {host}");
        if let Some(axum::extract::ConnectInfo(addr)) = req
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        {
            let _ = writeln!(out, "remote: {addr}");
        }
        for (name, value) in req.headers() {
            let _ = writeln!(out, "header: {}: {}", name, value.to_str().unwrap_or("<binary>"));
        }

        Response::builder()
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(out))
            .map_err(|e| HttpError::new(e, 500))
    }
}

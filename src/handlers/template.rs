//! Fixed-content responder with `{{key}}` substitution.
//!
//! The template is rendered against an info map built from the request:
//! `method`, `path`, `query`, `host`, and `header.<lower-name>` for each
//! header. Unknown keys render empty.
use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use hyper::{Request, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::core::{
    HttpError,
    handler::{Handler, HandlerResult},
};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap());

pub struct TemplateHandler {
    template: String,
    status: StatusCode,
    header: HeaderMap,
    mime: String,
}

impl TemplateHandler {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            status: StatusCode::OK,
            header: HeaderMap::new(),
            mime: "text/plain; charset=utf-8".to_string(),
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, header: HeaderMap) -> Self {
        self.header = header;
        self
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    fn info_map(req: &Request<Body>) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("method".to_string(), req.method().to_string());
        info.insert("path".to_string(), req.uri().path().to_string());
        info.insert(
            "query".to_string(),
            req.uri().query().unwrap_or_default().to_string(),
        );
        info.insert(
            "host".to_string(),
            req.headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        );
        for (name, value) in req.headers() {
            info.insert(
                format!("header.{name}"),
                value.to_str().unwrap_or_default().to_string(),
            );
        }
        info
    }

    fn render(&self, info: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &regex::Captures<'_>| {
                info.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

#[async_trait]
impl Handler for TemplateHandler {
    async fn handle(&self, req: Request<Body>) -> HandlerResult {
        let body = self.render(&Self::info_map(&req));

        let mut res = Response::builder()
            .status(self.status)
            .body(Body::from(body))
            .map_err(|e| HttpError::new(e, 500))?;
        let headers = res.headers_mut();
        for (name, value) in &self.header {
            headers.append(name, value.clone());
        }
        if let Ok(mime) = HeaderValue::from_str(&self.mime) {
            headers.insert(header::CONTENT_TYPE, mime);
        }
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        Ok(res)
    }
}

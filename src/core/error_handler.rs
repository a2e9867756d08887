//! Error rendering and the process-wide error handler registry.
//!
//! Handlers and middleware report failures as [`HttpError`]; whichever layer
//! owns the response (the server adapter, or a protocol middleware such as
//! the SOAP fault handler) picks an [`ErrorHandler`] to turn the error into
//! a response. The default handler negotiates the body on `Accept`, applies
//! configured message rules, and enforces the logging policy: error level
//! with a captured backtrace for 5xx, debug below, and no response at all
//! for logging-only errors (status below 100).
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use axum::body::Body;
use http::{HeaderMap, HeaderName, HeaderValue, header, request::Parts};
use hyper::Response;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::core::error::HttpError;

/// Key of the handler that is always present and cannot be deleted.
pub const DEFAULT_HANDLER_KEY: &str = "__default__";

/// Renders an [`HttpError`] into a response. `None` means the error was
/// logging-only and nothing must be written.
pub trait ErrorHandler: Send + Sync + 'static {
    fn render(&self, parts: &Parts, err: &HttpError) -> Option<Response<Body>>;
}

/// Override rule applied by the default handler before rendering.
///
/// Codes and kinds match with shell globs (`*`, `?`); the message matches
/// with a regular expression. The first rule where all configured matchers
/// agree wins. The matched rule may replace status, content type, headers
/// and body.
#[derive(Debug, Clone, Default)]
pub struct MessageRule {
    pub codes: Vec<String>,
    pub kinds: Vec<String>,
    pub message: Option<Regex>,
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub header: HashMap<String, String>,
    pub body: Option<String>,
}

impl MessageRule {
    fn matches(&self, code: &str, kind: &str, message: &str) -> bool {
        if !self.codes.is_empty() && !self.codes.iter().any(|p| glob_match(p, code)) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.iter().any(|p| glob_match(p, kind)) {
            return false;
        }
        if let Some(re) = &self.message {
            if !re.is_match(message) {
                return false;
            }
        }
        true
    }
}

/// The standard error handler.
#[derive(Default)]
pub struct DefaultErrorHandler {
    rules: Vec<MessageRule>,
    /// Log a backtrace even for non-5xx errors.
    stack_always: bool,
}

impl DefaultErrorHandler {
    pub fn new(rules: Vec<MessageRule>, stack_always: bool) -> Self {
        Self {
            rules,
            stack_always,
        }
    }

    fn log(&self, parts: &Parts, err: &HttpError) {
        let status = err.status();
        if status >= 500 {
            let backtrace = std::backtrace::Backtrace::capture();
            tracing::error!(
                status,
                method = %parts.method,
                path = %parts.uri.path(),
                error = %err,
                backtrace = %backtrace,
                "request failed"
            );
        } else if self.stack_always {
            let backtrace = std::backtrace::Backtrace::capture();
            tracing::debug!(
                status,
                method = %parts.method,
                path = %parts.uri.path(),
                error = %err,
                backtrace = %backtrace,
                "request failed"
            );
        } else {
            tracing::debug!(
                status,
                method = %parts.method,
                path = %parts.uri.path(),
                error = %err,
                "request failed"
            );
        }
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn render(&self, parts: &Parts, err: &HttpError) -> Option<Response<Body>> {
        let code = err.elements().first().map(|e| e.code.as_str()).unwrap_or("");
        let kind = err
            .inner()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let message = err.to_string();

        let rule = self
            .rules
            .iter()
            .find(|r| r.matches(code, &kind, &message));

        let mut status = err.status();
        if let Some(r) = rule {
            if let Some(s) = r.status {
                status = s;
            }
        }

        self.log(parts, err);
        if status < 100 {
            // Logging only: the caller must not write a response.
            return None;
        }

        let accept = parts
            .headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok());
        let (negotiated, mut body) = err.content(accept);
        let mut mime = negotiated.to_string();

        let mut rule_header = HeaderMap::new();
        if let Some(r) = rule {
            if let Some(m) = &r.mime {
                mime = m.clone();
            }
            if let Some(b) = &r.body {
                body = b.clone().into_bytes();
            }
            for (name, value) in &r.header {
                if let (Ok(n), Ok(v)) = (
                    name.parse::<HeaderName>(),
                    HeaderValue::from_str(value),
                ) {
                    rule_header.insert(n, v);
                } else {
                    tracing::warn!("invalid rule header: {} = {}", name, value);
                }
            }
        }

        let mut builder = Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            // Error-carried headers first, then rule headers, then the fixed set.
            for (name, value) in err.header() {
                headers.append(name, value.clone());
            }
            for (name, value) in &rule_header {
                headers.insert(name, value.clone());
            }
            if let Ok(ct) = HeaderValue::from_str(&format!("{mime}; charset=utf-8")) {
                headers.insert(header::CONTENT_TYPE, ct);
            }
            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            headers.append(header::VARY, HeaderValue::from_static("Accept"));
        }

        Some(
            builder
                .body(Body::from(body))
                .unwrap_or_else(|_| Response::new(Body::empty())),
        )
    }
}

/// Errors from registry mutation.
#[derive(Debug, Error)]
pub enum HandlerRegistryError {
    #[error("the default error handler cannot be deleted")]
    DefaultUndeletable,
    #[error("error handler not found: {0}")]
    NotFound(String),
}

static HANDLERS: Lazy<RwLock<HashMap<String, Arc<dyn ErrorHandler>>>> = Lazy::new(|| {
    let mut map: HashMap<String, Arc<dyn ErrorHandler>> = HashMap::new();
    map.insert(
        DEFAULT_HANDLER_KEY.to_string(),
        Arc::new(DefaultErrorHandler::default()),
    );
    RwLock::new(map)
});

/// Fetch a registered handler, falling back to the default.
pub fn get_error_handler(name: &str) -> Arc<dyn ErrorHandler> {
    let handlers = HANDLERS.read().expect("error handler registry poisoned");
    handlers
        .get(name)
        .or_else(|| handlers.get(DEFAULT_HANDLER_KEY))
        .cloned()
        .expect("default error handler is always registered")
}

/// Fetch the process default handler.
pub fn default_error_handler() -> Arc<dyn ErrorHandler> {
    get_error_handler(DEFAULT_HANDLER_KEY)
}

/// Register or replace a handler. Replacement is atomic for readers: a reader
/// observes either the old or the new handler, never a torn state.
pub fn set_error_handler(name: &str, handler: Arc<dyn ErrorHandler>) {
    let mut handlers = HANDLERS.write().expect("error handler registry poisoned");
    handlers.insert(name.to_string(), handler);
}

/// Remove a named handler. The default entry is refused.
pub fn delete_error_handler(name: &str) -> Result<(), HandlerRegistryError> {
    if name == DEFAULT_HANDLER_KEY {
        return Err(HandlerRegistryError::DefaultUndeletable);
    }
    let mut handlers = HANDLERS.write().expect("error handler registry poisoned");
    handlers
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| HandlerRegistryError::NotFound(name.to_string()))
}

/// Shell-style glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    fn inner(p: &[u8], s: &[u8]) -> bool {
        match (p.first(), s.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], s) || (!s.is_empty() && inner(p, &s[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &s[1..]),
            (Some(pc), Some(sc)) if pc == sc => inner(&p[1..], &s[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), input.as_bytes())
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;
    use crate::core::error::{ERR_NOT_FOUND, ErrorElement};

    fn parts() -> Parts {
        let (parts, _) = Request::builder()
            .method("GET")
            .uri("/x")
            .header(header::ACCEPT, "application/json")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("E*", "E123"));
        assert!(glob_match("E?3", "E13"));
        assert!(!glob_match("E?3", "E133"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("E*", "F1"));
    }

    #[test]
    fn test_render_default_json() {
        let handler = DefaultErrorHandler::default();
        let res = handler.render(&parts(), &ERR_NOT_FOUND).unwrap();
        assert_eq!(res.status(), 404);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        assert_eq!(
            res.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        assert_eq!(res.headers().get(header::VARY).unwrap(), "Accept");
    }

    #[test]
    fn test_logging_only_returns_none() {
        let handler = DefaultErrorHandler::default();
        let err = HttpError::from_status(10);
        assert!(handler.render(&parts(), &err).is_none());
    }

    #[test]
    fn test_error_headers_reach_response() {
        let handler = DefaultErrorHandler::default();
        let mut err = HttpError::from_status(401);
        err.header_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"r\""),
        );
        let res = handler.render(&parts(), &err).unwrap();
        assert_eq!(
            res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"r\""
        );
    }

    #[test]
    fn test_first_matching_rule_overrides_status() {
        let rules = vec![
            MessageRule {
                codes: vec!["X*".to_string()],
                status: Some(410),
                ..Default::default()
            },
            MessageRule {
                codes: vec!["E*".to_string()],
                status: Some(422),
                ..Default::default()
            },
            MessageRule {
                codes: vec!["E1".to_string()],
                status: Some(499),
                ..Default::default()
            },
        ];
        let handler = DefaultErrorHandler::new(rules, false);
        let mut err = HttpError::from_status(400);
        err.add_element(ErrorElement::new("E1", "m", "d"));
        let res = handler.render(&parts(), &err).unwrap();
        assert_eq!(res.status(), 422);
    }

    #[test]
    fn test_rule_body_override() {
        let rules = vec![MessageRule {
            body: Some("custom".to_string()),
            mime: Some("text/plain".to_string()),
            ..Default::default()
        }];
        let handler = DefaultErrorHandler::new(rules, false);
        let res = handler.render(&parts(), &ERR_NOT_FOUND).unwrap();
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_registry_default_is_undeletable() {
        assert!(matches!(
            delete_error_handler(DEFAULT_HANDLER_KEY),
            Err(HandlerRegistryError::DefaultUndeletable)
        ));
    }

    #[test]
    fn test_registry_set_and_get() {
        set_error_handler("custom-test", Arc::new(DefaultErrorHandler::default()));
        let _handler = get_error_handler("custom-test");
        delete_error_handler("custom-test").unwrap();
        // Missing names fall back to the default.
        let _fallback = get_error_handler("custom-test");
    }
}

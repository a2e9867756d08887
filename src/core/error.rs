//! HTTP error type used throughout the request pipeline.
//!
//! An [`HttpError`] carries the response status, an optional inner cause,
//! headers that must reach the client, and an ordered list of
//! machine-readable error elements. The body served to the client is
//! negotiated against the request's `Accept` header by [`HttpError::content`].
//!
//! A status below 100 marks the error as logging-only: the error handler
//! records it and writes no response.
use std::{error::Error as StdError, fmt, sync::Arc};

use http::{HeaderMap, StatusCode};
use once_cell::sync::Lazy;
use serde::Serialize;

/// A single machine-readable entry in an error response body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorElement {
    pub code: String,
    pub message: String,
    pub detail: String,
}

impl ErrorElement {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// Request-pipeline error with HTTP semantics.
///
/// Cheap to clone: the inner cause is reference-counted, so the process-wide
/// sentinels below can be handed out per request without re-allocation of
/// the cause chain.
#[derive(Debug, Clone)]
pub struct HttpError {
    status: u16,
    inner: Option<Arc<dyn StdError + Send + Sync>>,
    header: HeaderMap,
    elements: Vec<ErrorElement>,
}

impl HttpError {
    /// Create a new error from an inner cause and a status code.
    pub fn new<E>(inner: E, status: u16) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            status,
            inner: Some(Arc::new(inner)),
            header: HeaderMap::new(),
            elements: Vec::new(),
        }
    }

    /// Create an error with no inner cause.
    pub fn from_status(status: u16) -> Self {
        Self {
            status,
            inner: None,
            header: HeaderMap::new(),
            elements: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether this error is consumed by logging only (status below 100).
    pub fn is_logging_only(&self) -> bool {
        self.status < 100
    }

    /// Mutable access to the headers the response must carry.
    pub fn header_mut(&mut self) -> &mut HeaderMap {
        &mut self.header
    }

    pub fn header(&self) -> &HeaderMap {
        &self.header
    }

    /// Append an error element to the response body.
    pub fn add_element(&mut self, element: ErrorElement) -> &mut Self {
        self.elements.push(element);
        self
    }

    pub fn elements(&self) -> &[ErrorElement] {
        &self.elements
    }

    /// The inner cause, if any.
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.inner.as_deref()
    }

    fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
    }

    /// Negotiate the response body against a comma-separated `Accept` list.
    ///
    /// The first supported media range wins; an unparseable or unsupported
    /// list falls back to `application/json`.
    pub fn content(&self, accept: Option<&str>) -> (&'static str, Vec<u8>) {
        let payload = ErrorPayload {
            status: self.status,
            title: self.status_text(),
            errors: &self.elements,
        };

        for range in accept.unwrap_or("").split(',') {
            let media = range.split(';').next().unwrap_or("").trim();
            if media.is_empty() {
                continue;
            }
            match media.to_ascii_lowercase().as_str() {
                "application/json" | "text/json" => return payload.json(),
                "application/xml" | "text/xml" => return payload.xml(),
                "application/yaml" | "text/yaml" | "text/plain" => return payload.yaml(),
                _ => return payload.json(),
            }
        }
        payload.json()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => write!(f, "http error {}: {}", self.status, inner),
            None => write!(f, "http error {}: {}", self.status, self.status_text()),
        }
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    status: u16,
    title: &'a str,
    errors: &'a [ErrorElement],
}

impl ErrorPayload<'_> {
    fn json(&self) -> (&'static str, Vec<u8>) {
        let body = serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec());
        ("application/json", body)
    }

    fn yaml(&self) -> (&'static str, Vec<u8>) {
        let body = serde_yaml::to_string(self)
            .map(String::into_bytes)
            .unwrap_or_default();
        ("application/yaml", body)
    }

    fn xml(&self) -> (&'static str, Vec<u8>) {
        use quick_xml::escape::escape;

        let mut out = String::with_capacity(128);
        out.push_str("<error>");
        out.push_str(&format!("<status>{}</status>", self.status));
        out.push_str(&format!("<title>{}</title>", escape(self.title)));
        for e in self.errors {
            out.push_str("<element>");
            out.push_str(&format!("<code>{}</code>", escape(e.code.as_str())));
            out.push_str(&format!(
                "<message>{}</message>",
                escape(e.message.as_str())
            ));
            out.push_str(&format!("<detail>{}</detail>", escape(e.detail.as_str())));
            out.push_str("</element>");
        }
        out.push_str("</error>");
        ("application/xml", out.into_bytes())
    }
}

macro_rules! sentinel {
    ($(#[$doc:meta])* $name:ident, $status:expr) => {
        $(#[$doc])*
        pub static $name: Lazy<HttpError> = Lazy::new(|| HttpError::from_status($status));
    };
}

// Process-wide immutable sentinels. Callers needing per-request headers or
// error elements must construct a fresh error with `HttpError::new`.
sentinel!(ERR_BAD_REQUEST, 400);
sentinel!(ERR_UNAUTHORIZED, 401);
sentinel!(ERR_FORBIDDEN, 403);
sentinel!(ERR_NOT_FOUND, 404);
sentinel!(ERR_METHOD_NOT_ALLOWED, 405);
sentinel!(ERR_NOT_ACCEPTABLE, 406);
sentinel!(ERR_LENGTH_REQUIRED, 411);
sentinel!(ERR_ENTITY_TOO_LARGE, 413);
sentinel!(ERR_INTERNAL_SERVER_ERROR, 500);
sentinel!(ERR_BAD_GATEWAY, 502);
sentinel!(ERR_GATEWAY_TIMEOUT, 504);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_statuses() {
        assert_eq!(ERR_BAD_REQUEST.status(), 400);
        assert_eq!(ERR_ENTITY_TOO_LARGE.status(), 413);
        assert_eq!(ERR_GATEWAY_TIMEOUT.status(), 504);
        assert!(!ERR_BAD_REQUEST.is_logging_only());
    }

    #[test]
    fn test_logging_only_threshold() {
        assert!(HttpError::from_status(99).is_logging_only());
        assert!(!HttpError::from_status(100).is_logging_only());
    }

    #[test]
    fn test_content_negotiation_json_default() {
        let err = HttpError::from_status(404);
        let (mime, body) = err.content(None);
        assert_eq!(mime, "application/json");
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], 404);
        assert_eq!(v["title"], "Not Found");
    }

    #[test]
    fn test_content_negotiation_first_range_wins() {
        let err = HttpError::from_status(500);
        let (mime, _) = err.content(Some("text/xml, application/json"));
        assert_eq!(mime, "application/xml");
    }

    #[test]
    fn test_content_negotiation_unknown_falls_back_to_json() {
        let err = HttpError::from_status(500);
        let (mime, _) = err.content(Some("image/png"));
        assert_eq!(mime, "application/json");
    }

    #[test]
    fn test_content_yaml_for_text_plain() {
        let err = HttpError::from_status(400);
        let (mime, body) = err.content(Some("text/plain; q=0.9"));
        assert_eq!(mime, "application/yaml");
        assert!(String::from_utf8(body).unwrap().contains("status: 400"));
    }

    #[test]
    fn test_xml_body_escapes_content() {
        let mut err = HttpError::from_status(400);
        err.add_element(ErrorElement::new("E1", "<oops>", "a & b"));
        let (_, body) = err.content(Some("application/xml"));
        let s = String::from_utf8(body).unwrap();
        assert!(s.contains("&lt;oops&gt;"));
        assert!(s.contains("a &amp; b"));
    }

    #[test]
    fn test_elements_ordered() {
        let mut err = HttpError::from_status(400);
        err.add_element(ErrorElement::new("a", "", ""));
        err.add_element(ErrorElement::new("b", "", ""));
        assert_eq!(err.elements()[0].code, "a");
        assert_eq!(err.elements()[1].code, "b");
    }

    #[test]
    fn test_clone_shares_inner() {
        let err = HttpError::new(std::io::Error::other("boom"), 500);
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
        assert!(cloned.inner().is_some());
    }
}

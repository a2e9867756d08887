//! SOAP 1.1 fault rendering for downstream errors.
use std::fmt;

use axum::body::Body;
use http::{StatusCode, header, request::Parts};
use hyper::Response;

use super::xml::{XmlNode, write_document};
use crate::core::{HttpError, error_handler::ErrorHandler};

pub const SOAP_ENVELOPE_URI: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Marker error for requests that are not SOAP 1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMismatch;

impl fmt::Display for VersionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("request is not soap 1.1")
    }
}

impl std::error::Error for VersionMismatch {}

/// Formats any downstream error as a SOAP 1.1 fault envelope.
#[derive(Debug, Default)]
pub struct SoapFaultHandler;

impl SoapFaultHandler {
    fn fault_code(err: &HttpError) -> &'static str {
        if is_version_mismatch(err) {
            return "VersionMismatch";
        }
        match err.status() {
            400..=499 => "Client",
            _ => "Server",
        }
    }
}

impl ErrorHandler for SoapFaultHandler {
    fn render(&self, parts: &Parts, err: &HttpError) -> Option<Response<Body>> {
        if err.is_logging_only() {
            tracing::debug!(status = err.status(), error = %err, "soap fault suppressed");
            return None;
        }

        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let actor = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let message = err
            .inner()
            .map(|e| e.to_string())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());

        let envelope = fault_envelope(Self::fault_code(err), status, actor, &message);
        let body = write_document(&envelope);

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .ok()
    }
}

fn fault_envelope(code: &str, status: StatusCode, actor: &str, message: &str) -> XmlNode {
    let mut envelope = XmlNode::new("soap:Envelope");
    envelope
        .namespaces
        .push(("soap".to_string(), SOAP_ENVELOPE_URI.to_string()));

    let mut fault = XmlNode::new("soap:Fault");
    let mut faultcode = XmlNode::new("faultcode");
    faultcode.text = format!("soap:{code}");
    let mut faultstring = XmlNode::new("faultstring");
    faultstring.text = status.canonical_reason().unwrap_or_default().to_string();
    let mut faultactor = XmlNode::new("faultactor");
    faultactor.text = actor.to_string();

    let mut detail = XmlNode::new("detail");
    let mut detail_message = XmlNode::new("message");
    detail_message.text = message.to_string();
    let mut detail_status = XmlNode::new("statusCode");
    detail_status.text = status.as_u16().to_string();
    detail.children.push(detail_message);
    detail.children.push(detail_status);

    fault.children.push(faultcode);
    fault.children.push(faultstring);
    fault.children.push(faultactor);
    fault.children.push(detail);

    let mut body = XmlNode::new("soap:Body");
    body.children.push(fault);
    envelope.children.push(body);
    envelope
}

fn is_version_mismatch(err: &HttpError) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> =
        err.inner().map(|e| e as &(dyn std::error::Error + 'static));
    while let Some(e) = source {
        if e.is::<VersionMismatch>() {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::{super::xml, *};
    use crate::core::handler::collect_body;

    fn parts() -> Parts {
        let (parts, _) = Request::builder()
            .uri("/svc")
            .header(header::HOST, "gw.test")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn test_client_fault_shape() {
        let res = SoapFaultHandler
            .render(&parts(), &HttpError::from_status(400))
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/xml; charset=utf-8");
        let bytes = collect_body(res.into_body()).await.unwrap();
        let root = xml::parse(&bytes).unwrap();
        let fault = &root.children[0].children[0];
        assert_eq!(fault.name, "soap:Fault");
        let code = fault.children.iter().find(|c| c.name == "faultcode").unwrap();
        assert_eq!(code.text, "soap:Client");
        let actor = fault.children.iter().find(|c| c.name == "faultactor").unwrap();
        assert_eq!(actor.text, "gw.test");
        let detail = fault.children.iter().find(|c| c.name == "detail").unwrap();
        let status = detail.children.iter().find(|c| c.name == "statusCode").unwrap();
        assert_eq!(status.text, "400");
    }

    #[test]
    fn test_server_fault_code() {
        let res = SoapFaultHandler
            .render(&parts(), &HttpError::from_status(502))
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_version_mismatch_code() {
        let err = HttpError::new(VersionMismatch, 403);
        assert_eq!(SoapFaultHandler::fault_code(&err), "VersionMismatch");
    }

    #[test]
    fn test_logging_only_is_suppressed() {
        assert!(
            SoapFaultHandler
                .render(&parts(), &HttpError::from_status(99))
                .is_none()
        );
    }
}

//! SOAP 1.1 to REST translation.
//!
//! Inbound SOAP envelopes become `POST application/json` requests for the
//! downstream handler; the downstream JSON response is re-synthesized into a
//! SOAP envelope. Errors on either path render as SOAP faults rather than
//! the gateway's negotiated error bodies.
pub mod fault;
pub mod json;
pub mod xml;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{Method, header, request::Parts};
use hyper::{Request, Response};

use self::{
    fault::{SoapFaultHandler, VersionMismatch},
    json::TranslateOptions,
};
use crate::core::{
    HttpError,
    error::{ERR_BAD_GATEWAY, ERR_BAD_REQUEST},
    error_handler::ErrorHandler,
    handler::{Handler, HandlerResult, Middleware, collect_body},
};

const SOAP_ACTION: &str = "SOAPAction";

/// Translating middleware between SOAP 1.1 clients and a JSON downstream.
pub struct SoapRestMiddleware {
    options: TranslateOptions,
    faults: SoapFaultHandler,
}

impl SoapRestMiddleware {
    pub fn new(options: TranslateOptions) -> Self {
        Self {
            options,
            faults: SoapFaultHandler,
        }
    }

    /// SOAP 1.1 detection: `text/xml` content type or a `SOAPAction` header.
    fn is_soap_11(parts: &Parts) -> bool {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if content_type.contains("text/xml") {
            return true;
        }
        parts
            .headers
            .get(SOAP_ACTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.is_empty())
    }

    /// Render `err` as a SOAP fault, falling back to propagation for
    /// logging-only statuses.
    fn fault(&self, parts: &Parts, err: HttpError) -> HandlerResult {
        match self.faults.render(parts, &err) {
            Some(res) => Ok(res),
            None => Err(err),
        }
    }

    async fn translate_request(
        &self,
        parts: &Parts,
        body: Body,
    ) -> Result<Request<Body>, HttpError> {
        let bytes = collect_body(body).await?;
        let root = xml::parse(&bytes)
            .map_err(|e| HttpError::new(e, ERR_BAD_REQUEST.status()))?;
        let value = json::node_to_json(&root, &self.options);
        let payload = serde_json::to_vec(&value)
            .map_err(|e| HttpError::new(e, ERR_BAD_REQUEST.status()))?;

        let mut builder = Request::builder().method(Method::POST).uri(parts.uri.clone());
        for (name, value) in &parts.headers {
            if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
                builder = builder.header(name, value);
            }
        }
        let mut req = builder
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .map_err(|e| HttpError::new(e, 500))?;
        *req.extensions_mut() = parts.extensions.clone();
        Ok(req)
    }

    async fn translate_response(&self, res: Response<Body>) -> Result<Response<Body>, HttpError> {
        let (parts, body) = res.into_parts();
        let bytes = collect_body(body).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| HttpError::new(e, ERR_BAD_GATEWAY.status()))?;
        let root = json::json_to_node(&value, &self.options)
            .ok_or_else(|| ERR_BAD_GATEWAY.clone())?;
        let document = xml::write_document(&root);

        let mut res = Response::from_parts(parts, Body::from(document.clone()));
        let headers = res.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        headers.insert(header::CONTENT_LENGTH, document.len().into());
        Ok(res)
    }
}

#[async_trait]
impl Middleware for SoapRestMiddleware {
    async fn handle(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
        let (parts, body) = req.into_parts();

        if !Self::is_soap_11(&parts) {
            return self.fault(&parts, HttpError::new(VersionMismatch, 403));
        }

        let translated = match self.translate_request(&parts, body).await {
            Ok(req) => req,
            Err(err) => return self.fault(&parts, err),
        };

        match next.handle(translated).await {
            Ok(res) => match self.translate_response(res).await {
                Ok(res) => Ok(res),
                Err(err) => self.fault(&parts, err),
            },
            Err(err) => self.fault(&parts, err),
        }
    }
}

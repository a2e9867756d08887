//! Client certificate verification from a forwarding header.
//!
//! Upstream TLS terminators forward the client certificate as
//! `X-SSL-Client-Cert`, a base64-url encoding of the PEM. Decode and parse
//! failures are the client's fault (400); a certificate that parses but does
//! not chain to a configured root, or fails the optional fingerprint check,
//! is an authentication failure (401).
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use data_encoding::{BASE64URL, BASE64URL_NOPAD, HEXLOWER};
use hyper::Request;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::{certificate::X509Certificate, pem, prelude::FromDer};

use crate::core::{
    HttpError,
    error::{ERR_BAD_REQUEST, ERR_UNAUTHORIZED},
    handler::{Handler, HandlerResult, Middleware},
};

const CERT_HEADER: &str = "X-SSL-Client-Cert";
const FINGERPRINT_HEADER: &str = "X-SSL-Client-Fingerprint";

#[derive(Debug, Error)]
pub enum RootStoreError {
    #[error("root certificate is not valid PEM: {0}")]
    Pem(String),
    #[error("root certificate is not valid X.509: {0}")]
    X509(String),
}

/// Middleware validating forwarded client certificates against a fixed set
/// of trusted roots.
pub struct HeaderCertMiddleware {
    /// DER bytes of the trusted root certificates.
    roots: Vec<Vec<u8>>,
}

impl HeaderCertMiddleware {
    /// Build from PEM-encoded root certificates. Each input may carry
    /// several concatenated PEM blocks.
    pub fn from_pem_roots<I, S>(inputs: I) -> Result<Self, RootStoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut roots = Vec::new();
        for input in inputs {
            for block in pem::Pem::iter_from_buffer(input.as_ref()) {
                let block = block.map_err(|e| RootStoreError::Pem(e.to_string()))?;
                // Parse once up front so malformed roots fail at build time.
                X509Certificate::from_der(&block.contents)
                    .map_err(|e| RootStoreError::X509(e.to_string()))?;
                roots.push(block.contents);
            }
        }
        Ok(Self { roots })
    }

    /// Verify that `cert` is directly issued and signed by one of the roots.
    fn chains_to_root(&self, cert: &X509Certificate<'_>) -> bool {
        self.roots.iter().any(|der| {
            let Ok((_, root)) = X509Certificate::from_der(der) else {
                return false;
            };
            root.subject() == cert.issuer()
                && cert.verify_signature(Some(root.public_key())).is_ok()
        })
    }
}

#[async_trait]
impl Middleware for HeaderCertMiddleware {
    async fn handle(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
        let Some(encoded) = req
            .headers()
            .get(CERT_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return Err(ERR_BAD_REQUEST.clone());
        };

        let pem_bytes = decode_base64url(encoded).ok_or_else(|| ERR_BAD_REQUEST.clone())?;
        let (_, parsed) =
            pem::parse_x509_pem(&pem_bytes).map_err(|_| ERR_BAD_REQUEST.clone())?;
        let cert = parsed.parse_x509().map_err(|_| ERR_BAD_REQUEST.clone())?;

        if !cert.validity().is_valid() || !self.chains_to_root(&cert) {
            metrics::counter!(crate::metrics::PORTICO_AUTH_FAILURE_TOTAL, "method" => "HeaderCert")
                .increment(1);
            return Err(ERR_UNAUTHORIZED.clone());
        }

        if let Some(expected) = req
            .headers()
            .get(FINGERPRINT_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let digest = Sha256::digest(&parsed.contents);
            let actual = HEXLOWER.encode(&digest);
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                metrics::counter!(crate::metrics::PORTICO_AUTH_FAILURE_TOTAL, "method" => "HeaderCert")
                    .increment(1);
                return Err(ERR_UNAUTHORIZED.clone());
            }
        }

        metrics::counter!(crate::metrics::PORTICO_AUTH_SUCCESS_TOTAL, "method" => "HeaderCert").increment(1);
        next.handle(req).await
    }
}

/// Terminators differ on padding; accept both forms.
fn decode_base64url(input: &str) -> Option<Vec<u8>> {
    let input = input.trim();
    BASE64URL
        .decode(input.as_bytes())
        .or_else(|_| BASE64URL_NOPAD.decode(input.as_bytes()))
        .ok()
}

//! HTTP Digest authentication (RFC 7616).
//!
//! Supported algorithms are MD5, SHA-256 and SHA-512-256, with `qop=auth`
//! only. `auth-int` and the `-sess` algorithm variants are rejected. The
//! response hash is verified as
//!
//! ```text
//! A1 = H(username : realm : secret)        (server realm, not the client's)
//! A2 = H(method : uri)
//! KD = H(A1 : nonce : nc : cnonce : qop : A2)
//! ```
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use http::{HeaderValue, header, request::Parts};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512_256};
use subtle::ConstantTimeEq;

use crate::{
    auth::{CredentialStore, DecryptFn},
    core::{Claims, HttpError, error::ERR_UNAUTHORIZED},
    middleware::authn::{AuthHandler, AuthResult},
};

/// Hash algorithm advertised in the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DigestAlgorithm {
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-512-256")]
    Sha512_256,
}

impl DigestAlgorithm {
    /// Parse a configured algorithm token. Session and integrity variants
    /// are not recognized.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "MD5" => Some(DigestAlgorithm::Md5),
            "SHA-256" => Some(DigestAlgorithm::Sha256),
            "SHA-512-256" => Some(DigestAlgorithm::Sha512_256),
            _ => None,
        }
    }

    fn token(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512_256 => "SHA-512-256",
        }
    }

    fn hash(&self, input: &str) -> String {
        match self {
            DigestAlgorithm::Md5 => format!("{:x}", md5::compute(input.as_bytes())),
            DigestAlgorithm::Sha256 => {
                let mut h = Sha256::new();
                h.update(input.as_bytes());
                hex(&h.finalize())
            }
            DigestAlgorithm::Sha512_256 => {
                let mut h = Sha512_256::new();
                h.update(input.as_bytes());
                hex(&h.finalize())
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(bytes)
}

/// Digest scheme handler for the authentication aggregator.
pub struct DigestAuth {
    realm: String,
    algorithm: DigestAlgorithm,
    store: Arc<dyn CredentialStore>,
    decrypt: DecryptFn,
    prefer_error: bool,
    keep_credentials: bool,
}

impl DigestAuth {
    pub fn new(realm: &str, store: Arc<dyn CredentialStore>, decrypt: DecryptFn) -> Self {
        Self {
            realm: realm.to_string(),
            algorithm: DigestAlgorithm::default(),
            store,
            decrypt,
            prefer_error: false,
            keep_credentials: false,
        }
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_prefer_error(mut self, prefer_error: bool) -> Self {
        self.prefer_error = prefer_error;
        self
    }

    pub fn with_keep_credentials(mut self, keep: bool) -> Self {
        self.keep_credentials = keep;
        self
    }

    fn challenge(&self) -> AuthResult {
        let mut nonce_bytes = [0u8; 30];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = STANDARD.encode(nonce_bytes);

        let mut err = ERR_UNAUTHORIZED.clone();
        let value = format!(
            "Digest algorithm={},qop=\"auth\",realm=\"{}\",nonce=\"{}\",charset=UTF-8",
            self.algorithm.token(),
            self.realm,
            nonce,
        );
        if let Ok(v) = HeaderValue::from_str(&value) {
            err.header_mut().insert(header::WWW_AUTHENTICATE, v);
        }
        AuthResult::Challenge(err)
    }

    fn reject(&self) -> AuthResult {
        if self.prefer_error {
            AuthResult::Failed(ERR_UNAUTHORIZED.clone())
        } else {
            self.challenge()
        }
    }

    /// Compute the expected response hash for a parsed authorization.
    fn expected_response(&self, method: &str, secret: &[u8], auth: &DigestFields) -> String {
        let secret = String::from_utf8_lossy(secret);
        let a1 = self
            .algorithm
            .hash(&format!("{}:{}:{}", auth.username, self.realm, secret));
        let a2 = self.algorithm.hash(&format!("{method}:{}", auth.uri));
        self.algorithm.hash(&format!(
            "{a1}:{}:{}:{}:{}:{a2}",
            auth.nonce, auth.nc, auth.cnonce, auth.qop
        ))
    }
}

#[derive(Debug)]
struct DigestFields {
    username: String,
    uri: String,
    nonce: String,
    response: String,
    nc: String,
    cnonce: String,
    qop: String,
    algorithm: Option<String>,
}

impl DigestFields {
    fn parse(value: &str) -> Option<Self> {
        let params = value.strip_prefix("Digest ")?;
        let fields = split_params(params);
        Some(Self {
            username: fields.get("username")?.clone(),
            uri: fields.get("uri")?.clone(),
            nonce: fields.get("nonce")?.clone(),
            response: fields.get("response")?.clone(),
            nc: fields.get("nc")?.clone(),
            cnonce: fields.get("cnonce")?.clone(),
            qop: fields.get("qop")?.clone(),
            algorithm: fields.get("algorithm").cloned(),
        })
    }
}

/// Split `k=v, k="v,with,commas"` parameter lists, honoring quotes.
fn split_params(input: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut depth_quoted = false;
    let mut current = String::new();
    let mut parts = Vec::new();
    for c in input.chars() {
        match c {
            '"' => {
                depth_quoted = !depth_quoted;
                current.push(c);
            }
            ',' if !depth_quoted => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);

    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        fields.insert(key.trim().to_ascii_lowercase(), value.to_string());
    }
    fields
}

#[async_trait]
impl AuthHandler for DigestAuth {
    async fn authenticate(&self, parts: &Parts) -> AuthResult {
        let Some(value) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return self.challenge();
        };

        let Some(fields) = DigestFields::parse(value) else {
            return self.challenge();
        };

        // qop=auth only; -sess variants and algorithm mismatches fail hard.
        if fields.qop != "auth" {
            return AuthResult::Failed(ERR_UNAUTHORIZED.clone());
        }
        if let Some(alg) = &fields.algorithm {
            if !alg.eq_ignore_ascii_case(self.algorithm.token()) {
                return AuthResult::Failed(ERR_UNAUTHORIZED.clone());
            }
        }

        let Some(credential) = self.store.get(&fields.username).await else {
            return self.reject();
        };

        let secret = match (self.decrypt)(&credential.secret) {
            Ok(secret) => secret,
            Err(err) => {
                tracing::warn!(user = %fields.username, error = %err, "secret decrypt failed");
                return AuthResult::Failed(HttpError::new(err, 500));
            }
        };

        let expected = self.expected_response(parts.method.as_str(), &secret, &fields);
        let provided = fields.response.to_ascii_lowercase();
        let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
        if !matches {
            return AuthResult::Failed(ERR_UNAUTHORIZED.clone());
        }

        AuthResult::Succeeded {
            claims: Claims::new("Digest", &fields.username, credential.attrs),
            strip_authorization: !self.keep_credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryStore, SecretDecrypt, decrypt_fn};

    async fn handler(algorithm: DigestAlgorithm) -> DigestAuth {
        let store = MemoryStore::new();
        store.set("alice", Credential::new(b"secret".to_vec())).await;
        DigestAuth::new("R", Arc::new(store), decrypt_fn(SecretDecrypt::None, None))
            .with_algorithm(algorithm)
    }

    fn authorization(algorithm: DigestAlgorithm, password: &str, nonce: &str) -> String {
        // Client-side computation of the expected response.
        let a1 = algorithm.hash(&format!("alice:R:{password}"));
        let a2 = algorithm.hash("GET:/x");
        let response = algorithm.hash(&format!("{a1}:{nonce}:00000001:abcdef:auth:{a2}"));
        format!(
            "Digest username=\"alice\", realm=\"R\", uri=\"/x\", nonce=\"{nonce}\", \
             nc=00000001, cnonce=\"abcdef\", qop=auth, response=\"{response}\", algorithm={}",
            algorithm.token()
        )
    }

    fn request(authorization_value: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().method("GET").uri("/x");
        if let Some(a) = authorization_value {
            builder = builder.header(header::AUTHORIZATION, a);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_challenge_shape() {
        let result = handler(DigestAlgorithm::Md5)
            .await
            .authenticate(&request(None))
            .await;
        let AuthResult::Challenge(err) = result else {
            panic!("expected challenge");
        };
        assert_eq!(err.status(), 401);
        let www = err
            .header()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(www.starts_with("Digest algorithm=MD5,qop=\"auth\",realm=\"R\",nonce=\""));
        assert!(www.ends_with("\",charset=UTF-8"));

        // The nonce is 30 random bytes, base64: 40 characters.
        let nonce = www.split("nonce=\"").nth(1).unwrap().split('"').next().unwrap();
        assert_eq!(nonce.len(), 40);
    }

    #[tokio::test]
    async fn test_correct_response_succeeds_all_algorithms() {
        for algorithm in [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512_256,
        ] {
            let auth = authorization(algorithm, "secret", "n0nce");
            let result = handler(algorithm)
                .await
                .authenticate(&request(Some(&auth)))
                .await;
            let AuthResult::Succeeded { claims, .. } = result else {
                panic!("expected success for {algorithm:?}");
            };
            assert_eq!(claims.method, "Digest");
            assert_eq!(claims.name, "alice");
        }
    }

    #[tokio::test]
    async fn test_wrong_password_fails_hard() {
        let auth = authorization(DigestAlgorithm::Md5, "wrong", "n0nce");
        let result = handler(DigestAlgorithm::Md5)
            .await
            .authenticate(&request(Some(&auth)))
            .await;
        assert!(matches!(result, AuthResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_sess_variant_rejected() {
        let auth = authorization(DigestAlgorithm::Md5, "secret", "n0nce")
            .replace("algorithm=MD5", "algorithm=MD5-sess");
        let result = handler(DigestAlgorithm::Md5)
            .await
            .authenticate(&request(Some(&auth)))
            .await;
        assert!(matches!(result, AuthResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_auth_int_qop_rejected() {
        let auth = authorization(DigestAlgorithm::Md5, "secret", "n0nce")
            .replace("qop=auth", "qop=auth-int");
        let result = handler(DigestAlgorithm::Md5)
            .await
            .authenticate(&request(Some(&auth)))
            .await;
        assert!(matches!(result, AuthResult::Failed(_)));
    }

    #[test]
    fn test_split_params_handles_quoted_commas() {
        let fields = split_params("a=\"x,y\", b=plain, c=\"z\"");
        assert_eq!(fields["a"], "x,y");
        assert_eq!(fields["b"], "plain");
        assert_eq!(fields["c"], "z");
    }

    #[test]
    fn test_known_md5_vector() {
        // RFC 2617 example: user "Mufasa", realm "testrealm@host.com",
        // password "Circle Of Life", GET /dir/index.html.
        let alg = DigestAlgorithm::Md5;
        let a1 = alg.hash("Mufasa:testrealm@host.com:Circle Of Life");
        let a2 = alg.hash("GET:/dir/index.html");
        let kd = alg.hash(&format!(
            "{a1}:dcd98b7102dd2f0e8b11d0f600bfb0c093:00000001:0a4f113b:auth:{a2}"
        ));
        assert_eq!(kd, "6629fae49393a05397450978507c4ef1");
    }
}

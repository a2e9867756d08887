//! HTTP Basic authentication (RFC 7617).
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use http::{HeaderValue, header, request::Parts};

use crate::{
    auth::{CredentialStore, DecryptFn, PasswordCompare, verify_password},
    core::{Claims, HttpError, error::ERR_UNAUTHORIZED},
    middleware::authn::{AuthHandler, AuthResult},
};

/// Basic scheme handler for the authentication aggregator.
pub struct BasicAuth {
    realm: String,
    store: Arc<dyn CredentialStore>,
    compare: PasswordCompare,
    decrypt: DecryptFn,
    /// Fail hard instead of re-challenging on credential miss or mismatch.
    prefer_error: bool,
    /// Leave the `Authorization` header on the forwarded request.
    keep_credentials: bool,
}

impl BasicAuth {
    pub fn new(realm: &str, store: Arc<dyn CredentialStore>, decrypt: DecryptFn) -> Self {
        Self {
            realm: realm.to_string(),
            store,
            compare: PasswordCompare::default(),
            decrypt,
            prefer_error: false,
            keep_credentials: false,
        }
    }

    pub fn with_compare(mut self, compare: PasswordCompare) -> Self {
        self.compare = compare;
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
        let mut err = ERR_UNAUTHORIZED.clone();
        let value = format!("Basic realm=\"{}\" charset=UTF-8", self.realm);
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

    /// Decode `user:password` from the header value after the scheme tag.
    fn decode(value: &str) -> Option<(String, String)> {
        let encoded = value.strip_prefix("Basic ")?.trim();
        let decoded = STANDARD.decode(encoded).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, pass) = text.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }
}

#[async_trait]
impl AuthHandler for BasicAuth {
    async fn authenticate(&self, parts: &Parts) -> AuthResult {
        let Some(value) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return self.challenge();
        };

        let Some((username, password)) = Self::decode(value) else {
            return self.challenge();
        };

        let Some(credential) = self.store.get(&username).await else {
            return self.reject();
        };

        let expected = match (self.decrypt)(&credential.secret) {
            Ok(secret) => secret,
            Err(err) => {
                tracing::warn!(user = %username, error = %err, "secret decrypt failed");
                return AuthResult::Failed(HttpError::new(err, 500));
            }
        };

        if !verify_password(self.compare, &expected, password.as_bytes()) {
            return self.reject();
        }

        AuthResult::Succeeded {
            claims: Claims::new("Basic", &username, credential.attrs),
            strip_authorization: !self.keep_credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryStore, SecretDecrypt, decrypt_fn};

    async fn handler(prefer_error: bool) -> BasicAuth {
        let store = MemoryStore::new();
        store.set("alice", Credential::new(b"secret".to_vec())).await;
        BasicAuth::new("R", Arc::new(store), decrypt_fn(SecretDecrypt::None, None))
            .with_prefer_error(prefer_error)
    }

    fn request(authorization: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().uri("/x");
        if let Some(a) = authorization {
            builder = builder.header(header::AUTHORIZATION, a);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    #[tokio::test]
    async fn test_missing_header_challenges() {
        let result = handler(false).await.authenticate(&request(None)).await;
        let AuthResult::Challenge(err) = result else {
            panic!("expected challenge");
        };
        assert_eq!(err.status(), 401);
        let www = err.header().get(header::WWW_AUTHENTICATE).unwrap();
        assert_eq!(www, "Basic realm=\"R\" charset=UTF-8");
    }

    #[tokio::test]
    async fn test_valid_credentials_succeed() {
        let result = handler(false)
            .await
            .authenticate(&request(Some(&basic("alice", "secret"))))
            .await;
        let AuthResult::Succeeded {
            claims,
            strip_authorization,
        } = result
        else {
            panic!("expected success");
        };
        assert_eq!(claims.method, "Basic");
        assert_eq!(claims.name, "alice");
        assert!(strip_authorization);
    }

    #[tokio::test]
    async fn test_unknown_user_rechallenges_by_default() {
        let result = handler(false)
            .await
            .authenticate(&request(Some(&basic("mallory", "x"))))
            .await;
        assert!(matches!(result, AuthResult::Challenge(_)));
    }

    #[tokio::test]
    async fn test_prefer_error_fails_hard() {
        let result = handler(true)
            .await
            .authenticate(&request(Some(&basic("mallory", "x"))))
            .await;
        let AuthResult::Failed(err) = result else {
            panic!("expected hard failure");
        };
        assert_eq!(err.status(), 401);
        assert!(err.header().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let result = handler(false)
            .await
            .authenticate(&request(Some(&basic("alice", "wrong"))))
            .await;
        assert!(matches!(result, AuthResult::Challenge(_)));
    }

    #[tokio::test]
    async fn test_keep_credentials_preserves_header() {
        let result = handler(false)
            .await
            .with_keep_credentials(true)
            .authenticate(&request(Some(&basic("alice", "secret"))))
            .await;
        let AuthResult::Succeeded {
            strip_authorization,
            ..
        } = result
        else {
            panic!("expected success");
        };
        assert!(!strip_authorization);
    }
}

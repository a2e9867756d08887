//! Credential lookup and password verification for the authentication
//! middleware family.
//!
//! A [`CredentialStore`] is the small key-value capability (get / set /
//! exists) specialized to `username -> credential`. Stores are populated at
//! configuration load from environment variables or a credential file, and
//! are read-only on the request path.
pub mod password;
pub mod secret;
pub mod store;

use async_trait::async_trait;
use thiserror::Error;

pub use password::{PasswordCompare, verify_password};
pub use secret::{DecryptFn, SecretDecrypt, decrypt_fn};
pub use store::MemoryStore;

/// A stored credential for one principal.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    /// The shared secret. May be ciphertext requiring one of the configured
    /// decrypt functions before comparison.
    pub secret: Vec<u8>,
    /// Arbitrary attributes published into claims on success.
    pub attrs: serde_json::Value,
}

impl Credential {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            attrs: serde_json::Value::Null,
        }
    }

    pub fn with_attrs(mut self, attrs: serde_json::Value) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Load-time errors from credential providers.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("duplicate username in credential source: {0}")]
    DuplicateUser(String),
    #[error("malformed credential line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("invalid attribute json for user {user}: {source}")]
    InvalidAttrs {
        user: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Key-value capability specialized to credential lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn get(&self, username: &str) -> Option<Credential>;

    async fn exists(&self, username: &str) -> bool {
        self.get(username).await.is_some()
    }

    async fn set(&self, username: &str, credential: Credential);
}

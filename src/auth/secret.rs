//! Secret decryption hooks.
//!
//! Stored secrets may be ciphertext. The configuration names a decrypt
//! strategy by identifier; the cipher primitives themselves are supplied by
//! the embedding application through [`DecryptFn`]. The built-in strategies
//! cover plaintext and base64-wrapped secrets.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoder::{EncodingKind, decode_string};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret decode failed: {0}")]
    Decode(String),
    #[error("decrypt function for {0:?} must be supplied by the application")]
    MissingPrimitive(SecretDecrypt),
}

/// Named decrypt strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SecretDecrypt {
    /// Secret is stored in the clear.
    #[default]
    None,
    /// Secret is base64 (standard alphabet, padded).
    Base64,
    /// AES-GCM ciphertext; primitive supplied externally.
    #[serde(rename = "AESGCM")]
    AesGcm,
    /// AES-CBC ciphertext; primitive supplied externally.
    #[serde(rename = "AESCBC")]
    AesCbc,
}

/// A symmetric decrypt function recovering the expected password bytes.
pub type DecryptFn = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, SecretError> + Send + Sync>;

/// Resolve the decrypt function for a strategy. AES strategies require the
/// application to install a primitive via `custom`; selecting one without
/// doing so fails at every use, never silently passing ciphertext through.
pub fn decrypt_fn(kind: SecretDecrypt, custom: Option<DecryptFn>) -> DecryptFn {
    match kind {
        SecretDecrypt::None => Arc::new(|secret| Ok(secret.to_vec())),
        SecretDecrypt::Base64 => Arc::new(|secret| {
            let text = std::str::from_utf8(secret)
                .map_err(|e| SecretError::Decode(e.to_string()))?;
            decode_string(EncodingKind::Base64, text)
                .map_err(|e| SecretError::Decode(e.to_string()))
        }),
        SecretDecrypt::AesGcm | SecretDecrypt::AesCbc => {
            custom.unwrap_or_else(|| Arc::new(move |_| Err(SecretError::MissingPrimitive(kind))))
        }
    }
}

//! Password comparison strategies.
//!
//! Plain comparison is constant-time so a lookup miss and a near-miss are
//! indistinguishable by timing. BCrypt treats the stored secret as a bcrypt
//! hash string.
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// How a presented password is compared against the stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PasswordCompare {
    /// Constant-time byte equality.
    #[default]
    Plain,
    /// Stored secret is a bcrypt hash.
    BCrypt,
}

/// Verify `provided` against `stored` with the selected strategy.
pub fn verify_password(kind: PasswordCompare, stored: &[u8], provided: &[u8]) -> bool {
    match kind {
        PasswordCompare::Plain => stored.ct_eq(provided).into(),
        PasswordCompare::BCrypt => {
            let Ok(hash) = std::str::from_utf8(stored) else {
                return false;
            };
            bcrypt::verify(provided, hash).unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_compare() {
        assert!(verify_password(PasswordCompare::Plain, b"secret", b"secret"));
        assert!(!verify_password(PasswordCompare::Plain, b"secret", b"Secret"));
        assert!(!verify_password(PasswordCompare::Plain, b"secret", b"secre"));
    }

    #[test]
    fn test_bcrypt_compare() {
        let hash = bcrypt::hash("secret", 4).unwrap();
        assert!(verify_password(
            PasswordCompare::BCrypt,
            hash.as_bytes(),
            b"secret"
        ));
        assert!(!verify_password(
            PasswordCompare::BCrypt,
            hash.as_bytes(),
            b"wrong"
        ));
    }

    #[test]
    fn test_bcrypt_invalid_hash_fails_closed() {
        assert!(!verify_password(
            PasswordCompare::BCrypt,
            b"not-a-hash",
            b"secret"
        ));
    }
}

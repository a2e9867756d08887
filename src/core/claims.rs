//! Authenticated-principal facts attached to a request.
//!
//! Claims are created once by an authentication middleware on success and
//! never mutated afterwards. They ride in the request's `http::Extensions`,
//! keyed by the `Claims` type itself, so key collisions are impossible by
//! construction.
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Claims {
    /// Authentication method, e.g. "Basic" or "Digest".
    pub method: String,
    /// Unix seconds at which authentication succeeded.
    pub auth_time: i64,
    /// Authenticated principal name.
    pub name: String,
    /// Store-provided attributes for the principal.
    pub attrs: serde_json::Value,
}

impl Claims {
    pub fn new(method: &str, name: &str, attrs: serde_json::Value) -> Self {
        Self {
            method: method.to_string(),
            auth_time: chrono::Utc::now().timestamp(),
            name: name.to_string(),
            attrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_in_extensions() {
        let mut ext = http::Extensions::new();
        ext.insert(Claims::new("Basic", "alice", serde_json::Value::Null));

        let claims = ext.get::<Claims>().unwrap();
        assert_eq!(claims.method, "Basic");
        assert_eq!(claims.name, "alice");
        assert!(claims.auth_time > 0);
    }
}

//! Serializable per-request session state.
//!
//! A session is deserialized at the start of a request and reserialized on
//! the response path; mutations are never visible to concurrent requests.
//! Lifecycle state is a set-only flag bitset: once a flag is set it never
//! clears, with the single exception of `NEW`, which clears when a persisted
//! session is restored.
//!
//! Values that carry their own wire format implement [`BinaryMarshaler`] /
//! [`BinaryUnmarshaler`] and bypass the configured codec; everything else
//! goes through serde.
use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::encoder::{self, CodecError};

/// Session is newly created this request.
pub const NEW: u8 = 1 << 0;
/// Session was restored from persisted bytes.
pub const RESTORED: u8 = 1 << 1;
/// Session data changed and must be reserialized.
pub const UPDATED: u8 = 1 << 2;
/// Session should be deleted on the response path.
pub const DELETE: u8 = 1 << 3;
/// Session identifier should be rotated.
pub const REFRESH: u8 = 1 << 4;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no value stored for key")]
    NoValue,
    #[error("session codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("binary marshal error: {0}")]
    Binary(String),
}

/// Wire format for codec-encoded session values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionCodec {
    #[default]
    Json,
    Yaml,
}

impl SessionCodec {
    fn marshal<T: Serialize>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Json => encoder::marshal_json(value),
            Self::Yaml => encoder::marshal_yaml(value),
        }
    }

    fn unmarshal<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Self::Json => encoder::unmarshal_json(bytes),
            Self::Yaml => encoder::unmarshal_yaml(bytes),
        }
    }
}

/// A value that provides its own binary encoding, preferred over the codec.
pub trait BinaryMarshaler {
    fn marshal_binary(&self) -> Result<Vec<u8>, SessionError>;
}

/// Counterpart of [`BinaryMarshaler`] for extraction.
pub trait BinaryUnmarshaler {
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SessionError>;
}

/// Per-request session state holder.
#[derive(Debug, Clone)]
pub struct Session {
    raw: Vec<u8>,
    data: HashMap<String, Vec<u8>>,
    attrs: HashMap<String, serde_json::Value>,
    flags: u8,
    codec: SessionCodec,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a fresh session with the `NEW` flag set.
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            data: HashMap::new(),
            attrs: HashMap::new(),
            flags: NEW,
            codec: SessionCodec::default(),
        }
    }

    /// Replace the value codec. Only meaningful before any persist/extract.
    pub fn with_codec(mut self, codec: SessionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Set flag bits. Bits are never cleared through this method.
    pub fn set_flag(&mut self, flag: u8) {
        self.flags |= flag;
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn attrs(&self) -> &HashMap<String, serde_json::Value> {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        &mut self.attrs
    }

    /// Serialize `value` with the codec and store it under `key`.
    pub fn persist<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), SessionError> {
        let bytes = self.codec.marshal(value)?;
        self.data.insert(key.to_string(), bytes);
        self.set_flag(UPDATED);
        Ok(())
    }

    /// Store a value through its own binary encoding.
    pub fn persist_binary(
        &mut self,
        key: &str,
        value: &dyn BinaryMarshaler,
    ) -> Result<(), SessionError> {
        let bytes = value.marshal_binary()?;
        self.data.insert(key.to_string(), bytes);
        self.set_flag(UPDATED);
        Ok(())
    }

    /// Decode the value stored under `key` with the codec.
    pub fn extract<T: DeserializeOwned>(&self, key: &str) -> Result<T, SessionError> {
        let bytes = self.data.get(key).ok_or(SessionError::NoValue)?;
        Ok(self.codec.unmarshal(bytes)?)
    }

    /// Decode the value stored under `key` into a binary unmarshaler.
    pub fn extract_binary(
        &self,
        key: &str,
        into: &mut dyn BinaryUnmarshaler,
    ) -> Result<(), SessionError> {
        let bytes = self.data.get(key).ok_or(SessionError::NoValue)?;
        into.unmarshal_binary(bytes)
    }

    /// Remove a key. Sets `UPDATED` only when the key existed.
    pub fn delete(&mut self, key: &str) {
        if self.data.remove(key).is_some() {
            self.set_flag(UPDATED);
        }
    }

    /// Restore a session from persisted bytes. Sets `RESTORED`, clears `NEW`.
    pub fn unmarshal_binary(&mut self, raw: &[u8]) -> Result<(), SessionError> {
        self.data = self.codec.unmarshal(raw)?;
        self.raw = raw.to_vec();
        self.flags |= RESTORED;
        self.flags &= !NEW;
        Ok(())
    }

    /// Serialize the session. Returns the restored bytes verbatim when no
    /// update happened, avoiding the re-encode cost.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, SessionError> {
        if !self.has_flag(UPDATED) {
            return Ok(self.raw.clone());
        }
        Ok(self.codec.marshal(&self.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_extract_round_trip() {
        let mut session = Session::new();
        session.persist("user", &"alice".to_string()).unwrap();

        let raw = session.marshal_binary().unwrap();

        let mut restored = Session::new();
        restored.unmarshal_binary(&raw).unwrap();
        let user: String = restored.extract("user").unwrap();
        assert_eq!(user, "alice");
    }

    #[test]
    fn test_new_session_flags() {
        let session = Session::new();
        assert!(session.has_flag(NEW));
        assert!(!session.has_flag(UPDATED));
    }

    #[test]
    fn test_restore_clears_new_sets_restored() {
        let mut session = Session::new();
        session.unmarshal_binary(b"{}").unwrap();
        assert!(session.has_flag(RESTORED));
        assert!(!session.has_flag(NEW));
    }

    #[test]
    fn test_persist_sets_updated() {
        let mut session = Session::new();
        session.persist("k", &1u32).unwrap();
        assert!(session.has_flag(UPDATED));
    }

    #[test]
    fn test_marshal_returns_raw_when_not_updated() {
        let raw = br#"{"k":[49]}"#;
        let mut session = Session::new();
        session.unmarshal_binary(raw).unwrap();
        assert_eq!(session.marshal_binary().unwrap(), raw.to_vec());
    }

    #[test]
    fn test_delete_sets_updated_only_for_existing_key() {
        let mut session = Session::new();
        session.delete("absent");
        assert!(!session.has_flag(UPDATED));

        session.persist("k", &1u32).unwrap();
        let mut other = Session::new();
        other.unmarshal_binary(&session.marshal_binary().unwrap()).unwrap();
        other.delete("k");
        assert!(other.has_flag(UPDATED));
    }

    #[test]
    fn test_missing_key_is_no_value() {
        let session = Session::new();
        let err = session.extract::<String>("missing").unwrap_err();
        assert!(matches!(err, SessionError::NoValue));
    }

    struct Token(Vec<u8>);

    impl BinaryMarshaler for Token {
        fn marshal_binary(&self) -> Result<Vec<u8>, SessionError> {
            Ok(self.0.clone())
        }
    }

    impl BinaryUnmarshaler for Token {
        fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SessionError> {
            self.0 = data.to_vec();
            Ok(())
        }
    }

    #[test]
    fn test_yaml_codec_round_trip() {
        let mut session = Session::new().with_codec(SessionCodec::Yaml);
        session.persist("n", &42u32).unwrap();
        let n: u32 = session.extract("n").unwrap();
        assert_eq!(n, 42);
    }

    #[test]
    fn test_binary_marshaler_bypasses_codec() {
        let mut session = Session::new();
        session
            .persist_binary("tok", &Token(vec![0xde, 0xad]))
            .unwrap();
        let mut token = Token(Vec::new());
        session.extract_binary("tok", &mut token).unwrap();
        assert_eq!(token.0, vec![0xde, 0xad]);
    }
}

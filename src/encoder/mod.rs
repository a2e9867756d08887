//! Encoding families and marshal wrappers.
//!
//! Base-N string codecs are keyed by [`EncodingKind`]; the escaped base32
//! variants use vowel-free alphabets so generated identifiers cannot
//! accidentally spell English words. JSON and YAML marshal wrappers convert
//! codec failures to a structured [`CodecError`] whose display carries the
//! offending input with 1-based line numbers for diagnostics.
use std::fmt;

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use data_encoding::{BASE32, BASE32HEX, Encoding, HEXLOWER_PERMISSIVE, Specification};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Vowel-free base32 alphabet (standard ordering with vowels removed).
const BASE32_ESCAPED_ALPHABET: &str = "BCDFGHJKLMNPQRSTUVWXYZ0123456789";
/// Vowel-free base32 alphabet (hex-style ordering, digits first).
const BASE32HEX_ESCAPED_ALPHABET: &str = "0123456789BCDFGHJKLMNPQRSTUVWXYZ";

static BASE32_ESCAPED: Lazy<Encoding> = Lazy::new(|| escaped_encoding(BASE32_ESCAPED_ALPHABET));
static BASE32HEX_ESCAPED: Lazy<Encoding> =
    Lazy::new(|| escaped_encoding(BASE32HEX_ESCAPED_ALPHABET));

fn escaped_encoding(alphabet: &str) -> Encoding {
    let mut spec = Specification::new();
    spec.symbols.push_str(alphabet);
    spec.padding = Some('=');
    spec.encoding().expect("static alphabet is valid")
}

/// Selects one of the supported base-N codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EncodingKind {
    Base16,
    Base32,
    Base32Hex,
    Base32Escaped,
    /// The default for unknown or unset types.
    #[default]
    Base32HexEscaped,
    Base64,
    Base64Raw,
    #[serde(rename = "Base64URL")]
    Base64Url,
    #[serde(rename = "Base64RawURL")]
    Base64RawUrl,
}

#[derive(Debug, Error)]
#[error("decode failed for {kind:?}: {message}")]
pub struct DecodeError {
    pub kind: EncodingKind,
    pub message: String,
}

/// Encode bytes to a string with the selected codec.
pub fn encode_to_string(kind: EncodingKind, data: &[u8]) -> String {
    match kind {
        EncodingKind::Base16 => HEXLOWER_PERMISSIVE.encode(data),
        EncodingKind::Base32 => BASE32.encode(data),
        EncodingKind::Base32Hex => BASE32HEX.encode(data),
        EncodingKind::Base32Escaped => BASE32_ESCAPED.encode(data),
        EncodingKind::Base32HexEscaped => BASE32HEX_ESCAPED.encode(data),
        EncodingKind::Base64 => STANDARD.encode(data),
        EncodingKind::Base64Raw => STANDARD_NO_PAD.encode(data),
        EncodingKind::Base64Url => URL_SAFE.encode(data),
        EncodingKind::Base64RawUrl => URL_SAFE_NO_PAD.encode(data),
    }
}

/// Decode a string produced by [`encode_to_string`] with the same kind.
pub fn decode_string(kind: EncodingKind, input: &str) -> Result<Vec<u8>, DecodeError> {
    let wrap = |e: &dyn fmt::Display| DecodeError {
        kind,
        message: e.to_string(),
    };
    match kind {
        EncodingKind::Base16 => HEXLOWER_PERMISSIVE
            .decode(input.as_bytes())
            .map_err(|e| wrap(&e)),
        EncodingKind::Base32 => BASE32.decode(input.as_bytes()).map_err(|e| wrap(&e)),
        EncodingKind::Base32Hex => BASE32HEX.decode(input.as_bytes()).map_err(|e| wrap(&e)),
        EncodingKind::Base32Escaped => BASE32_ESCAPED
            .decode(input.as_bytes())
            .map_err(|e| wrap(&e)),
        EncodingKind::Base32HexEscaped => BASE32HEX_ESCAPED
            .decode(input.as_bytes())
            .map_err(|e| wrap(&e)),
        EncodingKind::Base64 => STANDARD.decode(input).map_err(|e| wrap(&e)),
        EncodingKind::Base64Raw => STANDARD_NO_PAD.decode(input).map_err(|e| wrap(&e)),
        EncodingKind::Base64Url => URL_SAFE.decode(input).map_err(|e| wrap(&e)),
        EncodingKind::Base64RawUrl => URL_SAFE_NO_PAD.decode(input).map_err(|e| wrap(&e)),
    }
}

/// Structured marshal/unmarshal failure carrying a line-numbered snippet of
/// the offending input.
#[derive(Debug)]
pub struct CodecError {
    pub format: &'static str,
    pub message: String,
    pub snippet: String,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} codec error: {}", self.format, self.message)?;
        if !self.snippet.is_empty() {
            write!(f, "\n{}", self.snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for CodecError {}

/// Prefix every line of an input with its 1-based line number.
pub fn numbered_snippet(input: &str) -> String {
    input
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn marshal_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError {
        format: "json",
        message: e.to_string(),
        snippet: String::new(),
    })
}

pub fn unmarshal_json<T: DeserializeOwned>(input: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(input).map_err(|e| CodecError {
        format: "json",
        message: e.to_string(),
        snippet: numbered_snippet(&String::from_utf8_lossy(input)),
    })
}

pub fn marshal_yaml<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| CodecError {
            format: "yaml",
            message: e.to_string(),
            snippet: String::new(),
        })
}

pub fn unmarshal_yaml<T: DeserializeOwned>(input: &[u8]) -> Result<T, CodecError> {
    serde_yaml::from_slice(input).map_err(|e| CodecError {
        format: "yaml",
        message: e.to_string(),
        snippet: numbered_snippet(&String::from_utf8_lossy(input)),
    })
}

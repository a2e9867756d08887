//! In-memory credential store and its load-time providers.
//!
//! The environment provider pairs `<user_prefix><N>` with `<pass_prefix><N>`
//! variables; indices present on only one side are silently dropped. The
//! file provider reads `username:password` or `username:password:json-attrs`
//! lines, ignoring blanks and `#` comments; a duplicate username is a
//! load-time error.
use std::{collections::HashMap, path::Path, sync::RwLock};

use async_trait::async_trait;

use crate::auth::{Credential, CredentialError, CredentialStore};

/// Default environment prefixes for the Basic auth provider.
pub const DEFAULT_BASIC_USERNAME_PREFIX: &str = "GATEWAY_BASIC_USERNAME_";
pub const DEFAULT_BASIC_PASSWORD_PREFIX: &str = "GATEWAY_BASIC_PASSWORD_";
/// Default environment prefixes for the Digest auth provider.
pub const DEFAULT_DIGEST_USERNAME_PREFIX: &str = "GATEWAY_DIGEST_USERNAME_";
pub const DEFAULT_DIGEST_PASSWORD_PREFIX: &str = "GATEWAY_DIGEST_PASSWORD_";

/// Map-backed credential store shared read-mostly across requests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from paired environment variables.
    pub fn from_env(user_prefix: &str, pass_prefix: &str) -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_iter(user_prefix, pass_prefix, &vars)
    }

    fn from_env_iter(
        user_prefix: &str,
        pass_prefix: &str,
        vars: &HashMap<String, String>,
    ) -> Self {
        let mut entries = HashMap::new();
        for (key, username) in vars {
            let Some(index) = key.strip_prefix(user_prefix) else {
                continue;
            };
            let Some(password) = vars.get(&format!("{pass_prefix}{index}")) else {
                // Unpaired index: drop silently.
                continue;
            };
            entries.insert(
                username.clone(),
                Credential::new(password.clone().into_bytes()),
            );
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Build a store from a credential file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_lines(&content)
    }

    fn from_lines(content: &str) -> Result<Self, CredentialError> {
        let mut entries: HashMap<String, Credential> = HashMap::new();
        for (number, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, ':');
            let user = fields.next().unwrap_or_default();
            let Some(password) = fields.next() else {
                return Err(CredentialError::MalformedLine {
                    line: number + 1,
                    reason: "expected username:password".to_string(),
                });
            };
            if user.is_empty() {
                return Err(CredentialError::MalformedLine {
                    line: number + 1,
                    reason: "empty username".to_string(),
                });
            }
            if entries.contains_key(user) {
                return Err(CredentialError::DuplicateUser(user.to_string()));
            }

            let mut credential = Credential::new(password.as_bytes().to_vec());
            if let Some(attrs) = fields.next() {
                let parsed =
                    serde_json::from_str(attrs).map_err(|e| CredentialError::InvalidAttrs {
                        user: user.to_string(),
                        source: e,
                    })?;
                credential = credential.with_attrs(parsed);
            }
            entries.insert(user.to_string(), credential);
        }
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, username: &str) -> Option<Credential> {
        self.entries
            .read()
            .ok()
            .and_then(|m| m.get(username).cloned())
    }

    async fn set(&self, username: &str, credential: Credential) {
        if let Ok(mut m) = self.entries.write() {
            m.insert(username.to_string(), credential);
        }
    }
}

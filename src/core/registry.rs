//! Typed resource registry.
//!
//! Configuration declares resources keyed by the tuple
//! `{apiVersion, kind, namespace, name}`. The registry maps each reference to
//! the object constructed for it at load time; references between resources
//! resolve here, at build time, so constructed objects only ever point at
//! already-built objects. The registry is immutable once construction
//! finishes and is shared read-only across requests.
use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    auth::CredentialStore,
    core::{
        error_handler::ErrorHandler,
        handler::{Handler, Middleware},
    },
};

fn default_meta() -> String {
    "default".to_string()
}

/// Unique identity of a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default = "default_meta")]
    pub namespace: String,
    #[serde(default = "default_meta")]
    pub name: String,
}

impl Reference {
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: if namespace.is_empty() {
                default_meta()
            } else {
                namespace.to_string()
            },
            name: if name.is_empty() {
                default_meta()
            } else {
                name.to_string()
            },
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

/// Errors raised while resolving references at build time. All of these are
/// configuration errors and fatal at load.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("resource not found: {reference}")]
    NotFound { reference: Reference },

    #[error("type assertion failed: {reference} is not a {want}")]
    TypeAssertion {
        reference: Reference,
        want: &'static str,
    },

    #[error("duplicate resource: {reference}")]
    Duplicate { reference: Reference },
}

/// A constructed resource held by the registry.
#[derive(Clone)]
pub enum Object {
    Middleware(Arc<dyn Middleware>),
    Handler(Arc<dyn Handler>),
    ErrorHandler(Arc<dyn ErrorHandler>),
    CredentialStore(Arc<dyn CredentialStore>),
}

impl Object {
    fn kind_name(&self) -> &'static str {
        match self {
            Object::Middleware(_) => "middleware",
            Object::Handler(_) => "handler",
            Object::ErrorHandler(_) => "error handler",
            Object::CredentialStore(_) => "credential store",
        }
    }
}

/// Build-time mapping from [`Reference`] to constructed objects.
#[derive(Default)]
pub struct Registry {
    objects: HashMap<Reference, Object>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructed object. Re-registering the same reference is a
    /// configuration error.
    pub fn insert(&mut self, reference: Reference, object: Object) -> Result<(), RegistryError> {
        if self.objects.contains_key(&reference) {
            return Err(RegistryError::Duplicate { reference });
        }
        self.objects.insert(reference, object);
        Ok(())
    }

    pub fn get(&self, reference: &Reference) -> Option<&Object> {
        self.objects.get(reference)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Resolve a reference to a middleware object.
    pub fn middleware(&self, reference: &Reference) -> Result<Arc<dyn Middleware>, RegistryError> {
        match self.resolve(reference)? {
            Object::Middleware(m) => Ok(m.clone()),
            other => {
                tracing::debug!(kind = other.kind_name(), %reference, "kind mismatch");
                Err(RegistryError::TypeAssertion {
                    reference: reference.clone(),
                    want: "middleware",
                })
            }
        }
    }

    /// Resolve a reference to a handler object.
    pub fn handler(&self, reference: &Reference) -> Result<Arc<dyn Handler>, RegistryError> {
        match self.resolve(reference)? {
            Object::Handler(h) => Ok(h.clone()),
            _ => Err(RegistryError::TypeAssertion {
                reference: reference.clone(),
                want: "handler",
            }),
        }
    }

    /// Resolve a reference to an error handler object.
    pub fn error_handler(
        &self,
        reference: &Reference,
    ) -> Result<Arc<dyn ErrorHandler>, RegistryError> {
        match self.resolve(reference)? {
            Object::ErrorHandler(h) => Ok(h.clone()),
            _ => Err(RegistryError::TypeAssertion {
                reference: reference.clone(),
                want: "error handler",
            }),
        }
    }

    /// Resolve a reference to a credential store object.
    pub fn credential_store(
        &self,
        reference: &Reference,
    ) -> Result<Arc<dyn CredentialStore>, RegistryError> {
        match self.resolve(reference)? {
            Object::CredentialStore(s) => Ok(s.clone()),
            _ => Err(RegistryError::TypeAssertion {
                reference: reference.clone(),
                want: "credential store",
            }),
        }
    }

    fn resolve(&self, reference: &Reference) -> Result<&Object, RegistryError> {
        self.objects
            .get(reference)
            .ok_or_else(|| RegistryError::NotFound {
                reference: reference.clone(),
            })
    }
}

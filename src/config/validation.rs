//! Configuration validation.
//!
//! Every problem is collected before reporting so a bad config surfaces all
//! of its mistakes in one pass.
use std::{collections::HashSet, net::SocketAddr, str::FromStr};

use http::Method;
use regex::Regex;

use crate::{
    config::models::{GatewayConfig, Manifest, Resource},
    core::registry::Reference,
    middleware::digest_auth::DigestAlgorithm,
};

pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("duplicate resource {reference}")]
    DuplicateResource { reference: String },

    #[error("{owner}: unresolved reference {reference}")]
    UnresolvedReference { owner: String, reference: String },

    #[error("{owner}: invalid field '{field}': {message}")]
    InvalidField {
        owner: String,
        field: String,
        message: String,
    },

    #[error("validation failed:\n{message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the whole configuration, aggregating every error found.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = config.listen_addr.parse::<SocketAddr>() {
            errors.push(ValidationError::InvalidListenAddress {
                address: config.listen_addr.clone(),
                reason: e.to_string(),
            });
        }

        let mut seen: HashSet<Reference> = HashSet::new();
        for manifest in &config.resources {
            let reference = manifest.reference();
            if !seen.insert(reference.clone()) {
                errors.push(ValidationError::DuplicateResource {
                    reference: format!("{reference:?}"),
                });
            }
        }

        for manifest in &config.resources {
            Self::validate_manifest(manifest, &seen, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            Err(ValidationError::ValidationFailed { message })
        }
    }

    fn validate_manifest(
        manifest: &Manifest,
        known: &HashSet<Reference>,
        errors: &mut Vec<ValidationError>,
    ) {
        let owner = format!(
            "{}/{} {}",
            manifest.metadata.namespace,
            manifest.metadata.name,
            manifest.resource.kind()
        );
        match &manifest.resource {
            Resource::Chain(chain) => {
                for reference in chain.middleware.iter().chain([&chain.handler]) {
                    if !known.contains(reference) {
                        errors.push(ValidationError::UnresolvedReference {
                            owner: owner.clone(),
                            reference: format!("{reference:?}"),
                        });
                    }
                }
                if !chain.pattern.is_empty() && !chain.pattern.starts_with('/') {
                    errors.push(ValidationError::InvalidField {
                        owner,
                        field: "pattern".to_string(),
                        message: "must start with '/'".to_string(),
                    });
                }
            }
            Resource::Cors(cors) => {
                for method in &cors.allowed_methods {
                    if Method::from_str(method).is_err() {
                        errors.push(ValidationError::InvalidField {
                            owner: owner.clone(),
                            field: "allowed_methods".to_string(),
                            message: format!("'{method}' is not an HTTP method"),
                        });
                    }
                }
            }
            Resource::DigestAuth(digest) => {
                if DigestAlgorithm::parse(&digest.algorithm).is_none() {
                    errors.push(ValidationError::InvalidField {
                        owner,
                        field: "algorithm".to_string(),
                        message: format!("unknown digest algorithm '{}'", digest.algorithm),
                    });
                }
            }
            Resource::ErrorHandler(handler) => {
                for (index, rule) in handler.rules.iter().enumerate() {
                    if let Some(pattern) = &rule.message {
                        if let Err(e) = Regex::new(pattern) {
                            errors.push(ValidationError::InvalidField {
                                owner: owner.clone(),
                                field: format!("rules[{index}].message"),
                                message: e.to_string(),
                            });
                        }
                    }
                    if let Some(status) = rule.status {
                        if !(100..=599).contains(&status) {
                            errors.push(ValidationError::InvalidField {
                                owner: owner.clone(),
                                field: format!("rules[{index}].status"),
                                message: format!("{status} is not an HTTP status"),
                            });
                        }
                    }
                }
            }
            Resource::BodyLimit(limit) => {
                if limit.max_size > 0 && limit.mem_limit > limit.max_size {
                    errors.push(ValidationError::InvalidField {
                        owner,
                        field: "mem_limit".to_string(),
                        message: "exceeds max_size".to_string(),
                    });
                }
            }
            Resource::Static(static_files) => {
                if static_files.root.is_empty() {
                    errors.push(ValidationError::InvalidField {
                        owner,
                        field: "root".to_string(),
                        message: "must not be empty".to_string(),
                    });
                }
            }
            Resource::Template(template) => {
                if !(100..=599).contains(&template.status) {
                    errors.push(ValidationError::InvalidField {
                        owner,
                        field: "status".to_string(),
                        message: format!("{} is not an HTTP status", template.status),
                    });
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> GatewayConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let cfg = config(
            r#"
listen_addr: "127.0.0.1:8080"
resources:
  - kind: Echo
    spec: {}
  - kind: Chain
    metadata:
      name: api
    spec:
      pattern: /api
      handler:
        apiVersion: app/v1
        kind: Echo
        name: default
"#,
        );
        GatewayConfigValidator::validate(&cfg).unwrap();
    }

    #[test]
    fn test_bad_listen_addr() {
        let cfg = config("listen_addr: not-an-addr\nresources: []\n");
        let err = GatewayConfigValidator::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("listen address"));
    }

    #[test]
    fn test_unresolved_chain_reference() {
        let cfg = config(
            r#"
listen_addr: "127.0.0.1:8080"
resources:
  - kind: Chain
    spec:
      handler:
        apiVersion: app/v1
        kind: Echo
        name: missing
"#,
        );
        let err = GatewayConfigValidator::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("unresolved reference"));
    }

    #[test]
    fn test_duplicate_resources() {
        let cfg = config(
            r#"
listen_addr: "127.0.0.1:8080"
resources:
  - kind: Echo
    spec: {}
  - kind: Echo
    spec: {}
"#,
        );
        let err = GatewayConfigValidator::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("duplicate resource"));
    }

    #[test]
    fn test_multiple_errors_aggregate() {
        let cfg = config(
            r#"
listen_addr: nope
resources:
  - kind: DigestAuth
    spec:
      algorithm: MD4
      credentials:
        source: env
  - kind: Cors
    spec:
      allowed_methods: ["GET", "NOT A METHOD"]
"#,
        );
        let err = GatewayConfigValidator::validate(&cfg).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("listen address"));
        assert!(text.contains("MD4"));
        assert!(text.contains("NOT A METHOD"));
    }
}

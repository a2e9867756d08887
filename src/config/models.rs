//! Declarative resource manifests.
//!
//! A gateway configuration is a listen address plus a list of resources,
//! each keyed by `{apiVersion, kind, metadata.namespace, metadata.name}`.
//! Spec fields map one-for-one onto the component they configure.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    auth::{password::PasswordCompare, secret::SecretDecrypt},
    core::registry::Reference,
};

fn default_namespace() -> String {
    "default".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub resources: Vec<Manifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "app/v1")]
    AppV1,
    #[serde(rename = "core/v1")]
    CoreV1,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppV1 => "app/v1",
            Self::CoreV1 => "core/v1",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_namespace")]
    pub name: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            name: default_namespace(),
        }
    }
}

/// One configured resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "apiVersion", default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub resource: Resource,
}

impl Manifest {
    /// Registry key for this manifest.
    pub fn reference(&self) -> Reference {
        Reference::new(
            self.api_version.as_str(),
            self.resource.kind(),
            &self.metadata.namespace,
            &self.metadata.name,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum Resource {
    Chain(ChainConfig),
    BodyLimit(BodyLimitConfig),
    Cors(CorsConfig),
    BasicAuth(BasicAuthConfig),
    DigestAuth(DigestAuthConfig),
    HeaderCert(HeaderCertConfig),
    SoapRest(SoapRestConfig),
    ErrorHandler(ErrorHandlerConfig),
    Echo(EchoConfig),
    Health(HealthConfig),
    Static(StaticConfig),
    Template(TemplateConfig),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chain(_) => "Chain",
            Self::BodyLimit(_) => "BodyLimit",
            Self::Cors(_) => "Cors",
            Self::BasicAuth(_) => "BasicAuth",
            Self::DigestAuth(_) => "DigestAuth",
            Self::HeaderCert(_) => "HeaderCert",
            Self::SoapRest(_) => "SoapRest",
            Self::ErrorHandler(_) => "ErrorHandler",
            Self::Echo(_) => "Echo",
            Self::Health(_) => "Health",
            Self::Static(_) => "Static",
            Self::Template(_) => "Template",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub middleware: Vec<Reference>,
    pub handler: Reference,
}

fn default_temp_path() -> String {
    "./".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyLimitConfig {
    #[serde(default)]
    pub max_size: i64,
    #[serde(default)]
    pub mem_limit: i64,
    #[serde(default = "default_temp_path")]
    pub temp_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub allowed_headers: String,
    #[serde(default)]
    pub exposed_headers: String,
    #[serde(default)]
    pub allow_credentials: bool,
    #[serde(default)]
    pub max_age: String,
    #[serde(default)]
    pub embedder_policy: String,
    #[serde(default)]
    pub opener_policy: String,
    #[serde(default)]
    pub resource_policy: String,
    #[serde(default)]
    pub allow_private_network: bool,
    #[serde(default)]
    pub disable_wildcard_origin: bool,
}

/// Where a credential store loads its users from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CredentialSource {
    Env {
        #[serde(default)]
        username_prefix: Option<String>,
        #[serde(default)]
        password_prefix: Option<String>,
    },
    File {
        path: String,
    },
}

fn default_realm() -> String {
    "Restricted".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    #[serde(default = "default_realm")]
    pub realm: String,
    pub credentials: CredentialSource,
    #[serde(default)]
    pub compare: PasswordCompare,
    #[serde(default)]
    pub decrypt: SecretDecrypt,
    #[serde(default)]
    pub prefer_error: bool,
    #[serde(default)]
    pub keep_credentials: bool,
}

fn default_algorithm() -> String {
    "MD5".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestAuthConfig {
    #[serde(default = "default_realm")]
    pub realm: String,
    pub credentials: CredentialSource,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub decrypt: SecretDecrypt,
    #[serde(default)]
    pub prefer_error: bool,
    #[serde(default)]
    pub keep_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeaderCertConfig {
    /// Paths to PEM files holding trusted root certificates.
    #[serde(default)]
    pub root_files: Vec<String>,
}

fn default_attr_key() -> String {
    "attrKey".to_string()
}

fn default_ns_key() -> String {
    "nsKey".to_string()
}

fn default_separator() -> String {
    ":".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoapRestConfig {
    #[serde(default = "default_attr_key")]
    pub attribute_key: String,
    #[serde(default = "default_ns_key")]
    pub namespace_key: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub extract_boolean: bool,
    #[serde(default)]
    pub extract_integer: bool,
    #[serde(default)]
    pub extract_float: bool,
}

impl Default for SoapRestConfig {
    fn default() -> Self {
        Self {
            attribute_key: default_attr_key(),
            namespace_key: default_ns_key(),
            separator: default_separator(),
            extract_boolean: false,
            extract_integer: false,
            extract_float: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorHandlerConfig {
    #[serde(default)]
    pub rules: Vec<MessageRuleConfig>,
    #[serde(default)]
    pub stack_always: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageRuleConfig {
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub header: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EchoConfig {}

fn default_health_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    pub root: String,
    #[serde(default)]
    pub strip_prefix: String,
}

fn default_status() -> u16 {
    200
}

fn default_mime() -> String {
    "text/plain; charset=utf-8".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub template: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_mime")]
    pub mime: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

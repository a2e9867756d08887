//! Protocol-sensitive middleware shipped with the gateway.
pub mod authn;
pub mod basic_auth;
pub mod body_limit;
pub mod cors;
pub mod digest_auth;
pub mod header_cert;
pub mod soap;

pub use authn::{AuthHandler, AuthResult, AuthnMiddleware};
pub use basic_auth::BasicAuth;
pub use body_limit::BodyLimitMiddleware;
pub use cors::{CorsMiddleware, CorsPolicy};
pub use digest_auth::{DigestAlgorithm, DigestAuth};
pub use header_cert::HeaderCertMiddleware;
pub use soap::SoapRestMiddleware;

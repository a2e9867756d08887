//! Pipeline engine: registry, chain assembly, error semantics, and the
//! request-scoped state carried through a chain.
pub mod chain;
pub mod claims;
pub mod error;
pub mod error_handler;
pub mod handler;
pub mod recorder;
pub mod registry;
pub mod session;

pub use chain::{AssembledChain, ChainSpec, assemble};
pub use claims::Claims;
pub use error::{ErrorElement, HttpError};
pub use handler::{Handler, HandlerResult, Middleware, RoundTripper, Tripperware};
pub use registry::{Object, Reference, Registry, RegistryError};

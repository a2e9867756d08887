//! Portico - a configurable API gateway.
//!
//! Portico assembles HTTP request pipelines from declarative resources. A
//! **chain** names an ordered list of middleware and a terminal handler, all
//! resolved by reference through a typed registry and mounted on an axum
//! router. This library exposes the building blocks so you can embed the
//! gateway or compose parts of it inside your own application.
//!
//! # Features
//! - Reference-resolved middleware chains with pattern scoping
//! - Bounded request-body intake with transparent disk spillover
//! - CORS enforcement (preflight and actual requests)
//! - Basic and Digest (RFC 7616) authentication over pluggable credential stores
//! - Forwarded client-certificate verification against configured roots
//! - Bidirectional SOAP 1.1 <-> JSON translation with fault rendering
//! - Negotiated error responses (JSON / XML / YAML)
//! - Echo, health, static-file and template terminal handlers
//! - Metrics (Prometheus style) & structured tracing via `tracing`
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! # Quick Example
//! ```no_run
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = portico::config::load_config("portico.yaml")?;
//! portico::config::GatewayConfigValidator::validate(&cfg)?;
//! portico::server::serve(cfg).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! `core` holds the composition engine: the registry, chain assembly, the
//! [`core::Handler`] / [`core::Middleware`] traits, the status-carrying
//! [`core::HttpError`] and the process-wide error-handler registry.
//! `middleware` and `handlers` are the shipped components, `config` the
//! declarative manifests, and `server` the router construction and serve
//! loop. End users should prefer the re-exports documented below instead of
//! reaching into internal modules directly.
//!
//! # Error Handling
//! Request-path failures travel as [`core::HttpError`] and render through the
//! active error handler with content negotiation. Configuration-time failures
//! return `eyre::Result<T>` with context attached using `WrapErr` for
//! debuggability.
//!
//! # Stability
//! This crate is early stage; APIs may evolve. Semantic versioning will be
//! followed after 1.0.
//!
//! # License
//! Licensed under Apache-2.0.
pub mod auth;
pub mod config;
pub mod core;
pub mod encoder;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod tracing_setup;
pub mod utils;

// Re-export the types most embedders reach for.
pub use crate::{
    core::{Handler, HandlerResult, HttpError, Middleware},
    utils::GracefulShutdown,
};

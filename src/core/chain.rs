//! Middleware chain assembly.
//!
//! A chain resource names a handler and an ordered list of middleware by
//! reference. Assembly resolves every reference through the registry, reads
//! the handler's patterns and methods, optionally prepends a path prefix,
//! and folds the middleware right-to-left around the handler so the first
//! listed middleware runs outermost. The result is pure composition with no
//! shared mutable state between requests.
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::Method;
use hyper::Request;

use crate::core::{
    handler::{Handler, HandlerResult, Middleware, RoundTripper, Tripperware},
    registry::{Reference, Registry, RegistryError},
};

/// Declarative description of one middleware chain.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    /// Optional path prefix prepended to every handler pattern.
    pub pattern: String,
    /// Middleware references, outermost first.
    pub middleware: Vec<Reference>,
    /// Reference to the terminal handler.
    pub handler: Reference,
}

/// Output of [`assemble`]: everything the router needs to mount the chain.
pub struct AssembledChain {
    pub methods: Vec<Method>,
    pub patterns: Vec<String>,
    pub handler: Arc<dyn Handler>,
}

/// Resolve a chain spec against the registry and compose its handler.
pub fn assemble(registry: &Registry, spec: &ChainSpec) -> Result<AssembledChain, RegistryError> {
    let mut middleware = Vec::with_capacity(spec.middleware.len());
    for reference in &spec.middleware {
        middleware.push(registry.middleware(reference)?);
    }

    let handler = registry.handler(&spec.handler)?;

    let methods = handler.methods();
    let patterns = handler
        .patterns()
        .iter()
        .map(|p| join_pattern(&spec.pattern, p))
        .collect();

    // Fold right-to-left so middleware[0] ends up outermost.
    let composed = middleware
        .into_iter()
        .rev()
        .fold(handler, |next, mw| Arc::new(Wrapped { mw, next }) as Arc<dyn Handler>);

    Ok(AssembledChain {
        methods,
        patterns,
        handler: composed,
    })
}

/// Compose tripperware around a transport, first listed outermost.
pub fn assemble_tripperware(
    tripperware: Vec<Arc<dyn Tripperware>>,
    transport: Arc<dyn RoundTripper>,
) -> Arc<dyn RoundTripper> {
    tripperware.into_iter().rev().fold(transport, |next, tw| {
        Arc::new(TrippedWrapped { tw, next }) as Arc<dyn RoundTripper>
    })
}

/// Join a prefix and a pattern with exactly one `/` at the boundary.
pub fn join_pattern(prefix: &str, pattern: &str) -> String {
    if prefix.is_empty() {
        return pattern.to_string();
    }
    let prefix = prefix.trim_end_matches('/');
    let pattern = pattern.trim_start_matches('/');
    format!("{prefix}/{pattern}")
}

struct Wrapped {
    mw: Arc<dyn Middleware>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Wrapped {
    async fn handle(&self, req: Request<Body>) -> HandlerResult {
        self.mw.handle(req, self.next.clone()).await
    }

    fn patterns(&self) -> Vec<String> {
        self.next.patterns()
    }

    fn methods(&self) -> Vec<Method> {
        self.next.methods()
    }
}

struct TrippedWrapped {
    tw: Arc<dyn Tripperware>,
    next: Arc<dyn RoundTripper>,
}

#[async_trait]
impl RoundTripper for TrippedWrapped {
    async fn round_trip(&self, req: Request<Body>) -> HandlerResult {
        self.tw.round_trip(req, self.next.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::HeaderValue;
    use hyper::Response;

    use super::*;
    use crate::core::registry::Object;

    /// Appends its tag to the request `X-T` header on the inbound pass, so
    /// outermost middleware contributes the leftmost tag.
    struct Tagging {
        tag: &'static str,
    }

    fn append_tag(req: &mut Request<Body>, tag: &str) {
        let prior = req
            .headers()
            .get("X-T")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let tagged = format!("{prior}{tag}");
        req.headers_mut()
            .insert("X-T", HeaderValue::from_str(&tagged).unwrap());
    }

    #[async_trait]
    impl Middleware for Tagging {
        async fn handle(&self, mut req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
            append_tag(&mut req, self.tag);
            next.handle(req).await
        }
    }

    struct TaggingHandler;

    #[async_trait]
    impl Handler for TaggingHandler {
        async fn handle(&self, mut req: Request<Body>) -> HandlerResult {
            append_tag(&mut req, "H");
            let trail = req.headers().get("X-T").unwrap().clone();
            let mut res = Response::new(Body::empty());
            res.headers_mut().insert("X-T", trail);
            Ok(res)
        }

        fn patterns(&self) -> Vec<String> {
            vec!["/echo".to_string()]
        }

        fn methods(&self) -> Vec<Method> {
            vec![Method::GET, Method::POST]
        }
    }

    fn build_registry() -> Registry {
        let mut registry = Registry::new();
        for tag in ["m0", "m1", "m2"] {
            registry
                .insert(
                    Reference::new("core/v1", "Tagging", "default", tag),
                    Object::Middleware(Arc::new(Tagging { tag })),
                )
                .unwrap();
        }
        registry
            .insert(
                Reference::new("core/v1", "TaggingHandler", "default", "default"),
                Object::Handler(Arc::new(TaggingHandler)),
            )
            .unwrap();
        registry
    }

    fn spec(pattern: &str) -> ChainSpec {
        ChainSpec {
            pattern: pattern.to_string(),
            middleware: vec![
                Reference::new("core/v1", "Tagging", "default", "m0"),
                Reference::new("core/v1", "Tagging", "default", "m1"),
                Reference::new("core/v1", "Tagging", "default", "m2"),
            ],
            handler: Reference::new("core/v1", "TaggingHandler", "default", "default"),
        }
    }

    #[tokio::test]
    async fn test_middleware_runs_outermost_first() {
        let registry = build_registry();
        let chain = assemble(&registry, &spec("")).unwrap();

        let res = chain
            .handler
            .handle(Request::new(Body::empty()))
            .await
            .unwrap();
        assert_eq!(res.headers().get("X-T").unwrap(), "m0m1m2H");
    }

    #[tokio::test]
    async fn test_methods_and_patterns_come_from_handler() {
        let registry = build_registry();
        let chain = assemble(&registry, &spec("")).unwrap();
        assert_eq!(chain.methods, vec![Method::GET, Method::POST]);
        assert_eq!(chain.patterns, vec!["/echo".to_string()]);
    }

    #[tokio::test]
    async fn test_pattern_prefix_joined_with_single_slash() {
        let registry = build_registry();
        let chain = assemble(&registry, &spec("/api/")).unwrap();
        assert_eq!(chain.patterns, vec!["/api/echo".to_string()]);
    }

    #[test]
    fn test_join_pattern_variants() {
        assert_eq!(join_pattern("", "/x"), "/x");
        assert_eq!(join_pattern("/api", "/x"), "/api/x");
        assert_eq!(join_pattern("/api/", "x"), "/api/x");
        assert_eq!(join_pattern("/api", "x"), "/api/x");
    }

    struct TaggingTripper {
        tag: &'static str,
    }

    #[async_trait]
    impl Tripperware for TaggingTripper {
        async fn round_trip(
            &self,
            mut req: Request<Body>,
            next: Arc<dyn RoundTripper>,
        ) -> HandlerResult {
            append_tag(&mut req, self.tag);
            next.round_trip(req).await
        }
    }

    struct TaggingTransport;

    #[async_trait]
    impl RoundTripper for TaggingTransport {
        async fn round_trip(&self, mut req: Request<Body>) -> HandlerResult {
            append_tag(&mut req, "T");
            let trail = req.headers().get("X-T").unwrap().clone();
            let mut res = Response::new(Body::empty());
            res.headers_mut().insert("X-T", trail);
            Ok(res)
        }
    }

    #[tokio::test]
    async fn test_tripperware_runs_outermost_first() {
        let transport = assemble_tripperware(
            vec![
                Arc::new(TaggingTripper { tag: "t0" }),
                Arc::new(TaggingTripper { tag: "t1" }),
            ],
            Arc::new(TaggingTransport),
        );
        let res = transport.round_trip(Request::new(Body::empty())).await.unwrap();
        assert_eq!(res.headers().get("X-T").unwrap(), "t0t1T");
    }

    #[test]
    fn test_missing_middleware_fails_assembly() {
        let registry = build_registry();
        let mut s = spec("");
        s.middleware
            .push(Reference::new("core/v1", "Tagging", "default", "absent"));
        assert!(matches!(
            assemble(&registry, &s),
            Err(RegistryError::NotFound { .. })
        ));
    }
}

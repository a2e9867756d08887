//! HTTP server assembly.
//!
//! Turns a validated [`GatewayConfig`] into a registry of built components,
//! mounts every chain on an axum [`Router`], and serves it with graceful
//! shutdown. `Err(HttpError)` results terminate here, rendered through the
//! process-wide default error handler.
use std::{str::FromStr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::Request,
    response::Response,
    routing::{MethodFilter, any, on},
};
use eyre::{Context, Result, eyre};
use http::{HeaderValue, Method, StatusCode};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    auth::{
        MemoryStore, decrypt_fn,
        store::{
            DEFAULT_BASIC_PASSWORD_PREFIX, DEFAULT_BASIC_USERNAME_PREFIX,
            DEFAULT_DIGEST_PASSWORD_PREFIX, DEFAULT_DIGEST_USERNAME_PREFIX,
        },
    },
    config::models::{CredentialSource, GatewayConfig, Manifest, Resource},
    core::{
        ChainSpec, Handler, HttpError, Object, Registry, assemble,
        error_handler::{DefaultErrorHandler, MessageRule, default_error_handler, set_error_handler},
        recorder::{ResponseRecord, record_response_with},
    },
    handlers::{EchoHandler, HealthHandler, StaticFileHandler, TemplateHandler},
    middleware::{
        AuthnMiddleware, BasicAuth, BodyLimitMiddleware, CorsMiddleware, CorsPolicy, DigestAuth,
        HeaderCertMiddleware, SoapRestMiddleware,
        digest_auth::DigestAlgorithm,
        soap::json::TranslateOptions,
    },
    utils::GracefulShutdown,
};

/// Build every configured resource and collect the chain specs.
pub fn build_registry(config: &GatewayConfig) -> Result<(Registry, Vec<ChainSpec>)> {
    let mut registry = Registry::new();
    let mut chains = Vec::new();

    for manifest in &config.resources {
        let reference = manifest.reference();
        let object = match &manifest.resource {
            Resource::Chain(chain) => {
                chains.push(ChainSpec {
                    pattern: chain.pattern.clone(),
                    middleware: chain.middleware.clone(),
                    handler: chain.handler.clone(),
                });
                continue;
            }
            Resource::ErrorHandler(handler) => {
                let built = Arc::new(build_error_handler(manifest, handler)?);
                set_error_handler(&manifest.metadata.name, built.clone());
                Object::ErrorHandler(built)
            }
            Resource::BodyLimit(limit) => Object::Middleware(Arc::new(BodyLimitMiddleware::new(
                limit.max_size,
                limit.mem_limit,
                limit.temp_path.clone(),
            ))),
            Resource::Cors(cors) => {
                let methods = cors
                    .allowed_methods
                    .iter()
                    .map(|m| Method::from_str(m))
                    .collect::<Result<Vec<_>, _>>()
                    .wrap_err_with(|| format!("{reference:?}: bad allowed_methods"))?;
                let policy = CorsPolicy::new(cors.allowed_origins.clone(), methods)
                    .allowed_headers(cors.allowed_headers.clone())
                    .exposed_headers(cors.exposed_headers.clone())
                    .allow_credentials(cors.allow_credentials)
                    .max_age(cors.max_age.clone())
                    .embedder_policy(cors.embedder_policy.clone())
                    .opener_policy(cors.opener_policy.clone())
                    .resource_policy(cors.resource_policy.clone())
                    .allow_private_network(cors.allow_private_network)
                    .disable_wildcard_origin(cors.disable_wildcard_origin);
                Object::Middleware(Arc::new(CorsMiddleware::new(policy)))
            }
            Resource::BasicAuth(basic) => {
                let store = build_store(
                    &basic.credentials,
                    DEFAULT_BASIC_USERNAME_PREFIX,
                    DEFAULT_BASIC_PASSWORD_PREFIX,
                )?;
                let auth = BasicAuth::new(&basic.realm, store, decrypt_fn(basic.decrypt, None))
                    .with_compare(basic.compare)
                    .with_prefer_error(basic.prefer_error)
                    .with_keep_credentials(basic.keep_credentials);
                Object::Middleware(Arc::new(AuthnMiddleware::single(Arc::new(auth))))
            }
            Resource::DigestAuth(digest) => {
                let algorithm = DigestAlgorithm::parse(&digest.algorithm)
                    .ok_or_else(|| eyre!("{reference:?}: unknown algorithm {}", digest.algorithm))?;
                let store = build_store(
                    &digest.credentials,
                    DEFAULT_DIGEST_USERNAME_PREFIX,
                    DEFAULT_DIGEST_PASSWORD_PREFIX,
                )?;
                let auth = DigestAuth::new(&digest.realm, store, decrypt_fn(digest.decrypt, None))
                    .with_algorithm(algorithm)
                    .with_prefer_error(digest.prefer_error)
                    .with_keep_credentials(digest.keep_credentials);
                Object::Middleware(Arc::new(AuthnMiddleware::single(Arc::new(auth))))
            }
            Resource::HeaderCert(cert) => {
                let mut roots = Vec::new();
                for path in &cert.root_files {
                    roots.push(
                        std::fs::read(path)
                            .wrap_err_with(|| format!("{reference:?}: cannot read {path}"))?,
                    );
                }
                let middleware = HeaderCertMiddleware::from_pem_roots(roots)
                    .wrap_err_with(|| format!("{reference:?}: bad root certificate"))?;
                Object::Middleware(Arc::new(middleware))
            }
            Resource::SoapRest(soap) => {
                let options = TranslateOptions {
                    attr_key: soap.attribute_key.clone(),
                    ns_key: soap.namespace_key.clone(),
                    sep: soap.separator.clone(),
                    extract_boolean: soap.extract_boolean,
                    extract_integer: soap.extract_integer,
                    extract_float: soap.extract_float,
                };
                Object::Middleware(Arc::new(SoapRestMiddleware::new(options)))
            }
            Resource::Echo(_) => Object::Handler(Arc::new(EchoHandler)),
            Resource::Health(health) => Object::Handler(Arc::new(HealthHandler::new(
                Vec::new(),
                Duration::from_millis(health.timeout_ms),
            ))),
            Resource::Static(static_files) => Object::Handler(Arc::new(
                StaticFileHandler::new(static_files.root.clone())
                    .strip_prefix(static_files.strip_prefix.clone()),
            )),
            Resource::Template(template) => {
                let status = StatusCode::from_u16(template.status)
                    .wrap_err_with(|| format!("{reference:?}: bad status"))?;
                let mut header = http::HeaderMap::new();
                for (name, value) in &template.header {
                    header.insert(
                        http::HeaderName::from_str(name)
                            .wrap_err_with(|| format!("{reference:?}: bad header name {name}"))?,
                        HeaderValue::from_str(value)
                            .wrap_err_with(|| format!("{reference:?}: bad header value"))?,
                    );
                }
                Object::Handler(Arc::new(
                    TemplateHandler::new(template.template.clone())
                        .status(status)
                        .header(header)
                        .mime(template.mime.clone()),
                ))
            }
        };
        registry
            .insert(reference, object)
            .map_err(|e| eyre!("{e}"))?;
    }

    Ok((registry, chains))
}

fn build_store(
    source: &CredentialSource,
    default_user_prefix: &str,
    default_pass_prefix: &str,
) -> Result<Arc<MemoryStore>> {
    let store = match source {
        CredentialSource::Env {
            username_prefix,
            password_prefix,
        } => MemoryStore::from_env(
            username_prefix.as_deref().unwrap_or(default_user_prefix),
            password_prefix.as_deref().unwrap_or(default_pass_prefix),
        ),
        CredentialSource::File { path } => {
            MemoryStore::from_file(path).wrap_err_with(|| format!("loading credentials from {path}"))?
        }
    };
    Ok(Arc::new(store))
}

fn build_error_handler(
    manifest: &Manifest,
    config: &crate::config::models::ErrorHandlerConfig,
) -> Result<DefaultErrorHandler> {
    let mut rules = Vec::with_capacity(config.rules.len());
    for rule in &config.rules {
        let message = rule
            .message
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .wrap_err_with(|| {
                format!("error handler {}: bad message pattern", manifest.metadata.name)
            })?;
        rules.push(MessageRule {
            codes: rule.codes.clone(),
            kinds: rule.kinds.clone(),
            message,
            status: rule.status,
            mime: rule.mime.clone(),
            header: rule.header.clone(),
            body: rule.body.clone(),
        });
    }
    Ok(DefaultErrorHandler::new(rules, config.stack_always))
}

/// Assemble every chain and mount it on a router, wrapped in the access-log
/// layer.
pub fn build_router(config: &GatewayConfig) -> Result<Router> {
    let (registry, chains) = build_registry(config)?;

    let mut router = Router::new();
    for spec in &chains {
        let chain = assemble(&registry, spec).map_err(|e| eyre!("{e}"))?;

        // Handlers without declared patterns mount at the chain pattern and
        // everything below it.
        let patterns = if chain.patterns.is_empty() {
            let base = if spec.pattern.is_empty() {
                "/".to_string()
            } else {
                spec.pattern.clone()
            };
            let tail = format!("{}/{{*rest}}", base.trim_end_matches('/'));
            vec![base, tail]
        } else {
            chain.patterns.clone()
        };

        for pattern in patterns {
            let handler = chain.handler.clone();
            let endpoint = move |req: Request| {
                let handler = handler.clone();
                async move { dispatch(handler, req).await }
            };
            let route = if chain.methods.is_empty() {
                any(endpoint)
            } else {
                let mut filter: Option<MethodFilter> = None;
                for method in &chain.methods {
                    let f = MethodFilter::try_from(method.clone())
                        .map_err(|e| eyre!("chain {}: {e}", spec.pattern))?;
                    filter = Some(match filter {
                        Some(existing) => existing.or(f),
                        None => f,
                    });
                }
                on(filter.expect("methods checked non-empty"), endpoint)
            };
            tracing::debug!(%pattern, "mounting chain");
            router = router.route(&pattern, route);
        }
    }

    Ok(router.layer(axum::middleware::from_fn(access_log)))
}

/// Run one request through a composed chain, rendering failures through the
/// default error handler. A logging-only error produces an empty 200.
async fn dispatch(handler: Arc<dyn Handler>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let rendering_parts = parts.clone();
    let req = Request::from_parts(parts, body);

    match handler.handle(req).await {
        Ok(res) => res,
        Err(err) => render_error(&rendering_parts, err),
    }
}

fn render_error(parts: &http::request::Parts, err: HttpError) -> Response {
    match default_error_handler().render(parts, &err) {
        Some(res) => res,
        None => Response::new(Body::empty()),
    }
}

/// Request-id injection, response recording, one log line per request.
async fn access_log(req: Request, next: axum::middleware::Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();
    let _timer = crate::metrics::RequestTimer::new(method.as_str());
    let span = crate::tracing_setup::create_request_span(method.as_str(), &path, &request_id);

    let res = next.run(req).instrument(span.clone()).await;

    let record = Arc::new(ResponseRecord::new());
    // The log line waits for the body to finish so the byte count is the
    // streamed total, not the pre-stream zero.
    let mut res = {
        let request_id = request_id.clone();
        let method = method.clone();
        record_response_with(res, record.clone(), move |record| {
            tracing::info!(
                %request_id,
                %method,
                path,
                status = record.status_code(),
                bytes = record.length(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request"
            );
        })
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert("x-request-id", value);
    }

    span.record("http.status_code", record.status_code());
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    metrics::counter!(
        crate::metrics::PORTICO_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => record.status_code().to_string()
    )
    .increment(1);
    res
}

/// Bind, serve, and drain on SIGTERM/SIGINT.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let router = build_router(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .wrap_err_with(|| format!("cannot bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening");

    let shutdown = Arc::new(GracefulShutdown::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.run_signal_handler().await });
    }

    let drain = {
        let shutdown = shutdown.clone();
        async move { shutdown.wait().await }
    };
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(drain)
    .await
    .wrap_err("server error")
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    fn config(yaml: &str) -> GatewayConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_echo_chain_end_to_end() {
        let cfg = config(
            r#"
listen_addr: "127.0.0.1:0"
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
        let router = build_router(&cfg).unwrap();
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/api")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert!(res.headers().contains_key("x-request-id"));
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("path: /api"));
    }

    #[tokio::test]
    async fn test_health_chain_mounts_handler_pattern() {
        let cfg = config(
            r#"
listen_addr: "127.0.0.1:0"
resources:
  - kind: Health
    spec: {}
  - kind: Chain
    metadata:
      name: health
    spec:
      handler:
        apiVersion: app/v1
        kind: Health
        name: default
"#,
        );
        let router = build_router(&cfg).unwrap();
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "healthy");
    }

    #[tokio::test]
    async fn test_error_renders_through_default_handler() {
        let cfg = config(
            r#"
listen_addr: "127.0.0.1:0"
resources:
  - kind: Cors
    spec:
      allowed_origins: ["http://a.test"]
      allowed_methods: ["GET"]
  - kind: Echo
    spec: {}
  - kind: Chain
    metadata:
      name: api
    spec:
      pattern: /api
      middleware:
        - apiVersion: app/v1
          kind: Cors
          name: default
      handler:
        apiVersion: app/v1
        kind: Echo
        name: default
"#,
        );
        let router = build_router(&cfg).unwrap();
        // Missing Origin: CORS denies, default handler renders 403.
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/api")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), 403);
        assert_eq!(
            res.headers()["x-content-type-options"],
            "nosniff"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let cfg = config("listen_addr: \"127.0.0.1:0\"\nresources: []\n");
        let router = build_router(&cfg).unwrap();
        let res = router
            .oneshot(Request::builder().uri("/none").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }
}

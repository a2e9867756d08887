//! Health probe handler.
//!
//! Runs the registered checkers under one shared deadline. A checker that
//! misses the deadline counts as unhealthy, and any unhealthy checker turns
//! the probe into a 504 rendered through the error pipeline.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::body::Body;
use http::header;
use hyper::{Request, Response};
use serde::Serialize;

use crate::core::{
    HttpError,
    error::ERR_GATEWAY_TIMEOUT,
    handler::{Handler, HandlerResult},
};

/// Pluggable readiness check.
#[async_trait]
pub trait HealthChecker: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Must observe cancellation and come back before the handler deadline.
    async fn check(&self) -> bool;
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    checks: BTreeMap<String, bool>,
}

pub struct HealthHandler {
    checkers: Vec<Arc<dyn HealthChecker>>,
    timeout: Duration,
}

impl HealthHandler {
    pub fn new(checkers: Vec<Arc<dyn HealthChecker>>, timeout: Duration) -> Self {
        Self { checkers, timeout }
    }
}

#[async_trait]
impl Handler for HealthHandler {
    async fn handle(&self, _req: Request<Body>) -> HandlerResult {
        let mut checks = BTreeMap::new();
        let deadline = tokio::time::Instant::now() + self.timeout;

        for checker in &self.checkers {
            let healthy = tokio::time::timeout_at(deadline, checker.check())
                .await
                .unwrap_or(false);
            checks.insert(checker.name().to_string(), healthy);
        }

        if checks.values().any(|healthy| !healthy) {
            tracing::warn!(?checks, "health probe failed");
            return Err(ERR_GATEWAY_TIMEOUT.clone());
        }

        let report = HealthReport {
            status: "healthy",
            checks,
        };
        let body =
            serde_json::to_vec(&report).map_err(|e| HttpError::new(e, 500))?;
        Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| HttpError::new(e, 500))
    }

    fn patterns(&self) -> Vec<String> {
        vec!["/health".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handler::collect_body;

    struct Fixed {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl HealthChecker for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> bool {
            self.healthy
        }
    }

    struct Stuck;

    #[async_trait]
    impl HealthChecker for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn check(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    fn req() -> Request<Body> {
        Request::builder().uri("/health").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let handler = HealthHandler::new(
            vec![
                Arc::new(Fixed { name: "db", healthy: true }),
                Arc::new(Fixed { name: "cache", healthy: true }),
            ],
            Duration::from_secs(1),
        );
        let res = handler.handle(req()).await.unwrap();
        assert_eq!(res.status(), 200);
        let bytes = collect_body(res.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["checks"]["db"], true);
    }

    #[tokio::test]
    async fn test_unhealthy_checker_is_504() {
        let handler = HealthHandler::new(
            vec![Arc::new(Fixed { name: "db", healthy: false })],
            Duration::from_secs(1),
        );
        let err = handler.handle(req()).await.unwrap_err();
        assert_eq!(err.status(), 504);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_counts_as_unhealthy() {
        let handler = HealthHandler::new(vec![Arc::new(Stuck)], Duration::from_millis(50));
        let err = handler.handle(req()).await.unwrap_err();
        assert_eq!(err.status(), 504);
    }
}

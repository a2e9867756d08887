//! Shutdown coordination for the serve loop.
//!
//! One broadcast channel fans the signal out to every in-flight listener;
//! SIGTERM and SIGINT both trigger it, and it can be raised manually from
//! tests or an admin path.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{signal, sync::broadcast};

pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    initiated: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::Relaxed)
    }

    /// Raise the shutdown signal. Later calls are ignored.
    pub fn trigger(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!("shutdown triggered");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Listen for SIGTERM / SIGINT and raise the signal on the first one.
    pub async fn run_signal_handler(&self) {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = wait_for_sigterm() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }
        self.trigger();
    }

    /// Resolve once shutdown is raised. Usable as axum's shutdown future.
    pub async fn wait(&self) {
        if self.is_initiated() {
            return;
        }
        let mut rx = self.shutdown_tx.subscribe();
        let _ = rx.recv().await;
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_initiated());
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_initiated());
    }

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger();
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn test_wait_resolves_for_late_subscriber() {
        let shutdown = Arc::new(GracefulShutdown::new());
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::task::yield_now().await;
        shutdown.trigger();
        waiter.await.unwrap();
    }
}

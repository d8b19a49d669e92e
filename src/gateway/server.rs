//! # HTTP Server Module
//!
//! This module owns the redirect listener and its lifecycle:
//!
//! ```text
//! Created --start()--> Listening --shutdown()--> ShuttingDown --> Stopped
//! ```
//!
//! `start()` binds the listener and spawns the accept loop on its own tokio task.
//! `shutdown()` cancels the accept loop and hands the accept task to a drain task
//! that waits for in-flight requests, bounded by the drain timeout. The drain runs
//! on its own task, so it keeps going even if the caller that triggered it is
//! dropped. Every caller, concurrent or later, waits for and observes the same
//! [`ShutdownOutcome`].
//!
//! ## Rust Concepts Used
//!
//! - `tokio::sync::watch` to publish the single drain outcome to all callers
//! - `tokio_util::sync::CancellationToken` as the stop-accepting signal
//! - The accept task's `JoinHandle` as the completion signal

use crate::core::error::{BalancerError, BalancerResult};
use crate::gateway::dispatcher::redirect_router;
use crate::load_balancing::Selector;
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How long `shutdown()` waits for in-flight requests
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of a [`RedirectServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Result of the drain sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The accept loop finished and all connections closed in time
    Drained,
    /// The drain timeout elapsed first. The accept loop was aborted; connections
    /// still in flight are left to finish on their own.
    TimedOut,
}

struct Inner {
    state: LifecycleState,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

/// Redirect server with explicit start/shutdown lifecycle
pub struct RedirectServer {
    bind_target: String,
    app: Router,
    drain_timeout: Duration,
    cancel: CancellationToken,
    inner: Arc<Mutex<Inner>>,
    outcome: Arc<watch::Sender<Option<ShutdownOutcome>>>,
}

impl RedirectServer {
    /// Create a server for an arbitrary application router
    pub fn new(bind_target: impl Into<String>, app: Router, drain_timeout: Duration) -> Self {
        Self {
            bind_target: bind_target.into(),
            app,
            drain_timeout,
            cancel: CancellationToken::new(),
            inner: Arc::new(Mutex::new(Inner {
                state: LifecycleState::Created,
                task: None,
                local_addr: None,
            })),
            outcome: Arc::new(watch::channel(None).0),
        }
    }

    /// Create a redirect server dispatching through `selector`
    pub fn for_selector(bind_target: impl Into<String>, selector: Arc<dyn Selector>) -> Self {
        Self::new(bind_target, redirect_router(selector), DEFAULT_DRAIN_TIMEOUT)
    }

    /// Override the drain timeout
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().local_addr
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Bind the listener and start accepting connections on a background task
    ///
    /// Returns the bound address as soon as the listener is ready; serving
    /// continues until [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self), fields(bind = %self.bind_target))]
    pub async fn start(&self) -> BalancerResult<SocketAddr> {
        self.ensure_state(LifecycleState::Created, "start")?;

        let listener = TcpListener::bind(&self.bind_target)
            .await
            .map_err(|e| BalancerError::Bind {
                address: self.bind_target.clone(),
                message: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let mut inner = self.inner.lock();
        // A concurrent start() or shutdown() may have won while we were binding.
        if inner.state != LifecycleState::Created {
            return Err(BalancerError::lifecycle(format!(
                "cannot start server in state {:?}",
                inner.state
            )));
        }

        let app = self.app.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;
            match result {
                Ok(()) => debug!("Accept loop finished"),
                Err(e) => error!(error = %e, "Accept loop failed"),
            }
        });

        inner.state = LifecycleState::Listening;
        inner.task = Some(task);
        inner.local_addr = Some(local_addr);

        info!(address = %local_addr, "Redirect server listening");
        Ok(local_addr)
    }

    /// Stop accepting connections and wait for in-flight requests to drain
    ///
    /// Returns `Ok(())` when the drain completed and a `ShutdownTimeout` error when
    /// the drain timeout elapsed. Either way the server ends in `Stopped`.
    /// Dropping the returned future does not interrupt the drain.
    pub async fn shutdown(&self) -> BalancerResult<()> {
        let mut outcome_rx = self.outcome.subscribe();
        self.begin_drain();

        let published = *outcome_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BalancerError::internal("shutdown outcome channel closed"))?;
        let outcome = published.unwrap_or(ShutdownOutcome::Drained);

        match outcome {
            ShutdownOutcome::Drained => Ok(()),
            ShutdownOutcome::TimedOut => Err(BalancerError::ShutdownTimeout {
                timeout_ms: duration_millis(self.drain_timeout),
            }),
        }
    }

    /// Runs under the lock without awaiting; only the first call has any effect
    fn begin_drain(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Created => {
                inner.state = LifecycleState::Stopped;
                info!("Shutdown requested before start, nothing to drain");
                self.outcome.send_replace(Some(ShutdownOutcome::Drained));
                return;
            }
            LifecycleState::ShuttingDown | LifecycleState::Stopped => return,
            LifecycleState::Listening => {}
        }
        inner.state = LifecycleState::ShuttingDown;
        let task = inner.task.take();

        let drain_timeout = self.drain_timeout;
        let timeout_ms = duration_millis(drain_timeout);
        info!(timeout_ms, "Shutdown signal received, draining in-flight requests");
        self.cancel.cancel();

        let state = Arc::clone(&self.inner);
        let outcome_tx = Arc::clone(&self.outcome);
        tokio::spawn(async move {
            let outcome = match task {
                Some(mut task) => match tokio::time::timeout(drain_timeout, &mut task).await {
                    Ok(Ok(())) => ShutdownOutcome::Drained,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Accept task ended abnormally");
                        ShutdownOutcome::Drained
                    }
                    Err(_) => {
                        task.abort();
                        ShutdownOutcome::TimedOut
                    }
                },
                None => ShutdownOutcome::Drained,
            };

            state.lock().state = LifecycleState::Stopped;

            match outcome {
                ShutdownOutcome::Drained => info!("Shutdown successful"),
                ShutdownOutcome::TimedOut => warn!(
                    timeout_ms,
                    "Shutdown timed out, in-flight requests left to finish on their own"
                ),
            }
            outcome_tx.send_replace(Some(outcome));
        });
    }

    fn ensure_state(&self, expected: LifecycleState, operation: &str) -> BalancerResult<()> {
        let state = self.inner.lock().state;
        if state != expected {
            return Err(BalancerError::lifecycle(format!(
                "cannot {} server in state {:?}",
                operation, state
            )));
        }
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancing::WeightedRoundRobin;

    fn server() -> RedirectServer {
        let wrr = WeightedRoundRobin::new();
        wrr.append_destination("http://h1", 1).unwrap();
        RedirectServer::for_selector("127.0.0.1:0", Arc::new(wrr))
            .with_drain_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_start_and_shutdown_transitions() {
        let server = server();
        assert_eq!(server.state(), LifecycleState::Created);
        assert!(server.local_addr().is_none());

        let addr = server.start().await.unwrap();
        assert_eq!(server.state(), LifecycleState::Listening);
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));

        server.shutdown().await.unwrap();
        assert_eq!(server.state(), LifecycleState::Stopped);

        // The listener is gone.
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let server = server();
        server.start().await.unwrap();

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, BalancerError::Lifecycle { .. }));

        server.shutdown().await.unwrap();
        assert!(server.start().await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let server = server();
        server.shutdown().await.unwrap();
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(server.start().await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_keeps_created_state() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap();

        let server = RedirectServer::for_selector(taken.to_string(), Arc::new(WeightedRoundRobin::new()));
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, BalancerError::Bind { .. }));
        assert_eq!(server.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_single_outcome() {
        let server = Arc::new(server());
        server.start().await.unwrap();

        let (a, b) = tokio::join!(server.shutdown(), server.shutdown());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(server.state(), LifecycleState::Stopped);

        // Later calls observe the same outcome.
        assert!(server.shutdown().await.is_ok());
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(250)), 250);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}

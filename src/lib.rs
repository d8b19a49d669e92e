//! # Redirect Balancer Library
//!
//! A redirecting HTTP load balancer. Every `GET`/`HEAD` request is answered with
//! a `307 Temporary Redirect` to one of the configured backend origins, chosen by
//! weighted round-robin, with the original path and query string appended.
//!
//! ## Modules
//!
//! - `core`: error types and configuration loading
//! - `load_balancing`: the thread-safe weighted destination selector
//! - `gateway`: the redirect dispatcher and the server lifecycle
//! - `observability`: structured logging setup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use redirect_balancer::{RedirectServer, WeightedRoundRobin};
//! use std::sync::Arc;
//!
//! # async fn run() -> redirect_balancer::BalancerResult<()> {
//! let pool = WeightedRoundRobin::new();
//! pool.append_destination("https://mirror-a.example.org", 5)?;
//! pool.append_destination("https://mirror-b.example.org", 1)?;
//!
//! let server = RedirectServer::for_selector("0.0.0.0:8080", Arc::new(pool));
//! server.start().await?;
//! // ... later, on a termination signal:
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

/// Error types and configuration
pub mod core;

/// Weighted destination selection
pub mod load_balancing;

/// Redirect dispatching and server lifecycle
pub mod gateway;

/// Logging setup
pub mod observability;

pub use crate::core::config::{BalancerConfig, ServerEntry};
pub use crate::core::error::{AppendError, BalancerError, BalancerResult, SelectionError};
pub use gateway::{redirect_router, LifecycleState, RedirectServer, ShutdownOutcome};
pub use load_balancing::{Algorithm, Destination, Selector, SelectorStats, WeightedRoundRobin};

//! # Configuration Module
//!
//! Loads the balancer configuration from a JSON file. The file names the bind
//! address, the port and the ordered list of redirect destinations:
//!
//! ```json
//! {
//!   "version": 1,
//!   "port": 8080,
//!   "address": "0.0.0.0",
//!   "servers": [
//!     { "url": "https://mirror-a.example.org", "weight": 5 },
//!     { "url": "https://mirror-b.example.org", "weight": 1 }
//!   ]
//! }
//! ```
//!
//! ## Key Features
//! - JSON parsing with serde
//! - Environment variable overrides (`BALANCER_PORT`, `BALANCER_ADDRESS`)
//! - Validation that reports every problem at once

use crate::core::error::{BalancerError, BalancerResult};
use crate::load_balancing::{Algorithm, WeightedRoundRobin};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Main balancer configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Configuration format version, informational only
    #[serde(default)]
    pub version: Option<u32>,

    /// Port the redirect listener binds to
    pub port: u16,

    /// Address the redirect listener binds to; empty means all interfaces
    #[serde(default)]
    pub address: String,

    /// Ordered destination list; order defines the traversal cycle
    #[serde(default)]
    pub servers: Vec<ServerEntry>,

    /// Selection algorithm
    #[serde(default)]
    pub algorithm: Algorithm,
}

/// One configured destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub url: String,

    /// Relative weight; 0 (or absent) is treated as the default weight
    #[serde(default)]
    pub weight: i64,
}

impl BalancerConfig {
    /// Load configuration from a JSON file, apply environment overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> BalancerResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            BalancerError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_json(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;

        debug!(
            path = %path.display(),
            servers = config.servers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration from a JSON string without validating it
    pub fn from_json(content: &str) -> BalancerResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| BalancerError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides to configuration
    ///
    /// `BALANCER_PORT` replaces `port`, `BALANCER_ADDRESS` replaces `address`.
    pub fn apply_env_overrides(&mut self) -> BalancerResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> BalancerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("BALANCER_PORT") {
            self.port = port
                .parse()
                .map_err(|e| BalancerError::config(format!("Invalid BALANCER_PORT: {}", e)))?;
        }
        if let Some(address) = lookup("BALANCER_ADDRESS") {
            self.address = address;
        }
        Ok(())
    }

    /// Validate the configuration, reporting all problems in one error
    pub fn validate(&self) -> BalancerResult<()> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("port must be greater than 0".to_string());
        }

        for (index, server) in self.servers.iter().enumerate() {
            if server.url.is_empty() {
                errors.push(format!("Server {} has empty url", index));
            }
            if server.weight < 0 {
                errors.push(format!(
                    "Server '{}' has negative weight {}",
                    server.url, server.weight
                ));
            }
        }

        if !errors.is_empty() {
            return Err(BalancerError::config(format!(
                "Configuration validation failed: {}",
                errors.join(", ")
            )));
        }

        if self.servers.is_empty() {
            warn!("No servers configured, every request will be answered with 503");
        }

        Ok(())
    }

    /// Address string handed to the listener, e.g. `0.0.0.0:8080` or `[::1]:8080`
    pub fn bind_target(&self) -> String {
        let host = match self.address.as_str() {
            "" => "0.0.0.0",
            host => host,
        };
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Build the destination pool from the configured servers, in order
    ///
    /// Any entry the pool rejects aborts the build.
    pub fn build_selector(&self) -> BalancerResult<WeightedRoundRobin> {
        let selector = WeightedRoundRobin::with_algorithm(self.algorithm);
        for server in &self.servers {
            selector.append_destination(&server.url, server.weight)?;
        }
        Ok(selector)
    }
}

//! Configuration data structures for Atrium.
//!
//! Two small pieces of configuration exist: where to bind the listener
//! ([`BindConfig`]) and the per-process options sourced from the environment
//! ([`Options`]). Both are serde-friendly with defaults so embedding
//! applications can deserialize them from their own config files if desired.
use std::env;

use serde::{Deserialize, Serialize};

/// Listener bind configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BindConfig {
    /// TCP port to listen on
    pub port: u16,
    /// IP address to bind (e.g. "0.0.0.0" or "::")
    pub address: String,
    /// Listen backlog passed to the socket
    pub backlog: u32,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            port: 80,
            address: "0.0.0.0".to_string(),
            backlog: 511,
        }
    }
}

/// Process-level options consumed by the pipeline.
///
/// Sourced from the `CORS_DOMAIN` and `USE_COMPRESSION` environment variables;
/// everything else about the process environment is the embedding
/// application's business.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Options {
    /// Value for the `Access-Control-Allow-Origin` response header
    pub cors_domain: String,
    /// Whether the compression stage is installed at construction time
    pub use_compression: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cors_domain: "*".to_string(),
            use_compression: false,
        }
    }
}

impl Options {
    /// Read options from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var("CORS_DOMAIN").ok(),
            env::var("USE_COMPRESSION").ok(),
        )
    }

    fn from_vars(cors_domain: Option<String>, use_compression: Option<String>) -> Self {
        Self {
            cors_domain: cors_domain
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "*".to_string()),
            use_compression: use_compression.as_deref().is_some_and(is_truthy),
        }
    }
}

/// Accepted truthy forms: `"true"` (any casing) or `"1"`.
fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

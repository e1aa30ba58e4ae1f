//! Proxy configuration, built from the environment.
//!
//! The proxy is configured the way the rest of the CLI tooling configures
//! it: a backend base URL, a config directory for durable state (identity
//! keypair, stored credential), and timeout budgets. Everything has a
//! sensible default so `hitl-proxy serve` works against a local backend
//! with no flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ProxyError;

/// Environment variable overriding the backend base URL.
pub const ENV_BACKEND_URL: &str = "HITL_BACKEND_URL";
/// Environment variable overriding the config directory.
pub const ENV_CONFIG_DIR: &str = "HITL_CONFIG_DIR";
/// Environment variable overriding the human-response timeout (seconds).
pub const ENV_CALL_TIMEOUT_SECS: &str = "HITL_CALL_TIMEOUT_SECS";

/// Default backend when none is configured (local development server).
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
/// Human-response timeout. Minutes-scale: a person has to pick up a phone.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Runtime configuration for the proxy process.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base URL of the backend relay (no trailing MCP path required).
    pub backend_base_url: String,
    /// Directory holding the identity keypair and stored credential.
    pub config_dir: PathBuf,
    /// Timeout for establishing HTTP connections.
    pub connect_timeout: Duration,
    /// Timeout for ordinary requests (catalog listing, key fetch).
    pub request_timeout: Duration,
    /// Timeout for tool invocations that wait on a human response.
    pub call_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend_base_url: DEFAULT_BACKEND_URL.to_string(),
            config_dir: default_config_dir(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

fn default_config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("hitl-proxy")
}

impl ProxyConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ProxyError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            if url.trim().is_empty() {
                return Err(ProxyError::Config(format!("{ENV_BACKEND_URL} is empty")));
            }
            config.backend_base_url = url;
        }

        if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
            config.config_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var(ENV_CALL_TIMEOUT_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                ProxyError::Config(format!("{ENV_CALL_TIMEOUT_SECS} must be an integer: {secs}"))
            })?;
            if secs == 0 {
                return Err(ProxyError::Config(format!(
                    "{ENV_CALL_TIMEOUT_SECS} must be greater than zero"
                )));
            }
            config.call_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Full MCP endpoint URL on the backend.
    ///
    /// Accepts either a bare base URL or a URL that already points at the
    /// MCP mount; the latter is used unchanged apart from the trailing slash.
    pub fn mcp_endpoint(&self) -> String {
        let base = self.backend_base_url.trim_end_matches('/');
        if base.ends_with("/mcp-server/mcp") {
            format!("{base}/")
        } else {
            format!("{base}/mcp-server/mcp/")
        }
    }

    /// Path of the identity keypair file.
    pub fn keypair_path(&self) -> PathBuf {
        self.config_dir.join("agent.key")
    }

    /// Path of the stored credential file written by the login flow.
    pub fn token_path(&self) -> PathBuf {
        self.config_dir.join("token.json")
    }
}

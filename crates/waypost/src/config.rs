//! Gateway configuration.
//!
//! Every field has a default suitable for local development. Deployed
//! gateways read overrides from the environment (and a `.env` file, if
//! present) via [`GatewayConfig::from_env`].

use std::time::Duration;

use waypost_bridge::BridgeOptions;
use waypost_transport::DEFAULT_CONNECT_TIMEOUT;

use crate::GatewayError;

pub const ENV_BIND: &str = "WAYPOST_BIND";
pub const ENV_BACKEND_URL: &str = "WAYPOST_BACKEND_URL";
pub const ENV_MODE: &str = "WAYPOST_ENV";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "WAYPOST_CONNECT_TIMEOUT_MS";
pub const ENV_CALL_TIMEOUT_MS: &str = "WAYPOST_CALL_TIMEOUT_MS";

/// Settings for one gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP listener binds to.
    pub bind: String,

    /// WebSocket URL of the RPC backend.
    pub backend_url: String,

    /// Production mode. Marks the session cookie `Secure`.
    pub production: bool,

    /// Upper bound on opening the backend socket.
    pub connect_timeout: Duration,

    /// Upper bound on waiting for one reply.
    pub call_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            backend_url: "ws://127.0.0.1:4000".to_string(),
            production: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: BridgeOptions::default().call_timeout,
        }
    }
}

impl GatewayConfig {
    /// Loads `.env` if there is one, then reads the process environment.
    ///
    /// # Errors
    /// [`GatewayError::Config`] if a timeout is not a whole number of
    /// milliseconds.
    pub fn from_env() -> Result<Self, GatewayError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep
    /// their defaults.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, GatewayError> {
        let mut config = Self::default();
        if let Some(bind) = lookup(ENV_BIND) {
            config.bind = bind;
        }
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            config.backend_url = url;
        }
        if let Some(mode) = lookup(ENV_MODE) {
            config.production = mode.trim().eq_ignore_ascii_case("production");
        }
        if let Some(ms) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout = parse_millis(ENV_CONNECT_TIMEOUT_MS, &ms)?;
        }
        if let Some(ms) = lookup(ENV_CALL_TIMEOUT_MS) {
            config.call_timeout = parse_millis(ENV_CALL_TIMEOUT_MS, &ms)?;
        }
        Ok(config)
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            connect_timeout: self.connect_timeout,
            call_timeout: self.call_timeout,
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, GatewayError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| GatewayError::Config(format!("{key} must be milliseconds, got {value:?}")))
}

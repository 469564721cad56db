//! Gate configuration.

use std::net::SocketAddr;
use std::time::Duration;

use trellis_core::OriginPolicy;

/// Configuration for one gate and its listener.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Upgrade route; `None` accepts any path.
    pub route: Option<String>,
    /// Origin allow-list; empty allows any origin.
    pub origins: Vec<String>,
    /// Capacity bound for the built-in socket pool.
    pub max_sockets: usize,
    /// Startup race window in milliseconds.
    pub startup_window_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7380,
            route: Some("/ws".to_string()),
            origins: Vec::new(),
            max_sockets: 1024,
            startup_window_ms: 1000,
        }
    }
}

impl GateConfig {
    /// Load configuration from `TRELLIS_*` environment variables,
    /// falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("TRELLIS_HOST").unwrap_or(defaults.host),
            port: std::env::var("TRELLIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            route: match std::env::var("TRELLIS_ROUTE") {
                Ok(route) if route.is_empty() => None,
                Ok(route) => Some(route),
                Err(_) => defaults.route,
            },
            origins: std::env::var("TRELLIS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.origins),
            max_sockets: std::env::var("TRELLIS_MAX_SOCKETS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_sockets),
            startup_window_ms: std::env::var("TRELLIS_STARTUP_WINDOW_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.startup_window_ms),
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        OriginPolicy::new(self.origins.clone())
    }

    pub fn startup_window(&self) -> Duration {
        Duration::from_millis(self.startup_window_ms)
    }
}

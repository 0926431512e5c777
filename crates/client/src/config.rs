//! Client configuration from explicit values or environment variables.

use std::time::Duration;

use crate::ws::ReconnectConfig;

/// Endpoints and timing for one live-auction client process.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Base URL of the REST collaborators (snapshot + bid history).
    pub rest_base_url: String,
    /// WebSocket endpoint of the live auction server.
    pub ws_url: String,
    /// Bounded wait for join/bid acknowledgments.
    pub ack_timeout: Duration,
    /// Reconnect backoff policy for the transport.
    pub reconnect: ReconnectConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            rest_base_url: "http://localhost:8080".to_string(),
            ws_url: "ws://localhost:8080/api/live".to_string(),
            ack_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl LiveConfig {
    /// Read configuration from environment variables, with defaults.
    ///
    /// - `MANDI_REST_URL`: REST base URL (default `http://localhost:8080`)
    /// - `MANDI_WS_URL`: WebSocket URL (default `ws://localhost:8080/api/live`)
    /// - `MANDI_ACK_TIMEOUT_MS`: ack wait in milliseconds (default 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let rest_base_url =
            std::env::var("MANDI_REST_URL").unwrap_or(defaults.rest_base_url);
        let ws_url = std::env::var("MANDI_WS_URL").unwrap_or(defaults.ws_url);
        let ack_timeout = std::env::var("MANDI_ACK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.ack_timeout);

        Self {
            rest_base_url,
            ws_url,
            ack_timeout,
            reconnect: ReconnectConfig::default(),
        }
    }
}

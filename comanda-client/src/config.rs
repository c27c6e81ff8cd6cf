//! Client configuration

use shared::session::ClientRole;
use uuid::Uuid;

/// Client configuration for connecting to a Comanda server
///
/// Persisted state (the table token, a stable per-device id) is the
/// embedder's concern; it lands here via the builder methods.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL (e.g., "http://localhost:3000")
    pub base_url: String,

    /// Message bus TCP address (e.g., "localhost:8081")
    pub bus_addr: String,

    /// Table token sent as `Authorization: Bearer` on order creation
    pub token: Option<String>,

    /// Stable per-device identifier; random when not supplied
    pub client_id: String,

    /// Observer role declared at handshake
    pub role: ClientRole,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Bounded reconnect attempts for the synchronizer loop
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnect attempts, in milliseconds
    pub reconnect_delay_ms: u64,
}

impl ClientConfig {
    /// Create a new configuration with a random device id
    pub fn new(
        base_url: impl Into<String>,
        bus_addr: impl Into<String>,
        role: ClientRole,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            bus_addr: bus_addr.into(),
            token: None,
            client_id: Uuid::new_v4().to_string(),
            role,
            timeout: 30,
            reconnect_attempts: 5,
            reconnect_delay_ms: 2000,
        }
    }

    /// Set the table token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set a stable device id (instead of the random default)
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay_ms = delay_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in() {
        let config = ClientConfig::new("http://localhost:3000", "localhost:8081", ClientRole::Kitchen);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay_ms, 2000);
        assert!(config.token.is_none());
        assert!(!config.client_id.is_empty());
    }

    #[test]
    fn builders_override() {
        let config = ClientConfig::new("http://localhost:3000", "localhost:8081", ClientRole::Admin)
            .with_token("secret")
            .with_client_id("tablet-7")
            .with_timeout(5)
            .with_reconnect(2, 100);

        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.client_id, "tablet-7");
        assert_eq!(config.timeout, 5);
        assert_eq!(config.reconnect_attempts, 2);
        assert_eq!(config.reconnect_delay_ms, 100);
    }
}

//! Server configuration.

use std::net::SocketAddr;

/// Configuration for the terminal-facing server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Whether a submission triggers a detached reconcile attempt.
    pub inline_sync: bool,
    /// Upper bound for the pending-transactions listing.
    pub pending_list_limit: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_body_bytes: 10 * 1024 * 1024,
            inline_sync: true,
            pending_list_limit: 100,
        }
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Enables or disables the inline reconcile attempt on submit.
    pub fn with_inline_sync(mut self, enabled: bool) -> Self {
        self.inline_sync = enabled;
        self
    }

    /// Sets the pending listing bound. Zero is treated as one.
    pub fn with_pending_list_limit(mut self, limit: usize) -> Self {
        self.pending_list_limit = limit.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.inline_sync);
        assert_eq!(config.pending_list_limit, 100);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_max_body_bytes(1024)
            .with_inline_sync(false)
            .with_pending_list_limit(0);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_body_bytes, 1024);
        assert!(!config.inline_sync);
        assert_eq!(config.pending_list_limit, 1);
    }
}

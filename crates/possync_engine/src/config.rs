//! Configuration for the reconciler and the upstream client.

use std::time::Duration;

/// Configuration for reconciliation cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Time between scheduled cycles.
    pub interval: Duration,
    /// Maximum records taken per cycle.
    pub batch_size: usize,
    /// Records processed in parallel within a cycle.
    pub concurrency: usize,
    /// Only reconcile this store, if set.
    pub store_filter: Option<String>,
}

impl ReconcileConfig {
    /// Creates the default configuration: every five minutes, ten records,
    /// one at a time.
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 10,
            concurrency: 1,
            store_filter: None,
        }
    }

    /// Sets the cycle interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the batch size. Zero is raised to one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets intra-cycle concurrency. Zero is raised to one.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Restricts reconciliation to one store.
    pub fn with_store_filter(mut self, store: impl Into<String>) -> Self {
        self.store_filter = Some(store.into().to_uppercase());
        self
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the upstream record API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://records.example.com/api`.
    pub base_url: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl UpstreamConfig {
    /// Creates a configuration for `base_url` with a 30 second timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:3000/api")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_config_builder() {
        let config = ReconcileConfig::new()
            .with_interval(Duration::from_secs(60))
            .with_batch_size(0)
            .with_concurrency(4)
            .with_store_filter("lapaz");

        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.store_filter.as_deref(), Some("LAPAZ"));
    }

    #[test]
    fn defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.concurrency, 1);

        let upstream = UpstreamConfig::new("https://up.example.com").with_timeout(Duration::from_secs(5));
        assert_eq!(upstream.timeout, Duration::from_secs(5));
    }
}

//! CLI command implementations.

pub mod compact;
pub mod pending;
pub mod reconcile_once;
pub mod serve;

use crate::{ReconcileArgs, UpstreamArgs};
use possync_engine::{ReconcileConfig, UpstreamConfig, UpstreamGateway, UreqClient};
use possync_staging::{JournalStagingStore, MemoryStagingStore, StagingStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Opens the journal at `path`, or an in-memory store when there is none.
pub fn open_store(
    journal: Option<&Path>,
) -> Result<Arc<dyn StagingStore>, Box<dyn std::error::Error>> {
    match journal {
        Some(path) => Ok(Arc::new(JournalStagingStore::open(path)?)),
        None => {
            tracing::warn!("no journal configured; staged transactions will not survive a restart");
            Ok(Arc::new(MemoryStagingStore::new()))
        }
    }
}

/// Builds the HTTP gateway for the upstream flags.
pub fn gateway(args: &UpstreamArgs) -> Arc<dyn UpstreamGateway> {
    let config = UpstreamConfig::new(args.upstream_url.clone())
        .with_timeout(Duration::from_secs(args.timeout_secs.max(1)));
    Arc::new(UreqClient::gateway(&config))
}

/// Builds the reconciler configuration for the reconcile flags.
pub fn reconcile_config(args: &ReconcileArgs, interval: Option<Duration>) -> ReconcileConfig {
    let mut config = ReconcileConfig::new()
        .with_batch_size(args.batch_size)
        .with_concurrency(args.concurrency);
    if let Some(interval) = interval {
        config = config.with_interval(interval);
    }
    if let Some(store) = args.store.as_deref().filter(|s| !s.trim().is_empty()) {
        config = config.with_store_filter(store.trim());
    }
    config
}

//! Serve command implementation.

use super::{gateway, open_store, reconcile_config};
use crate::{ReconcileArgs, UpstreamArgs};
use possync_engine::{ReconcileScheduler, Reconciler};
use possync_server::{HandlerContext, ServerConfig, SharedReconciler, SyncServer};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Options for the serve command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Time between reconciliation cycles.
    pub interval: Duration,
    /// Attempt a push right after each submission.
    pub inline_sync: bool,
    /// Upstream flags.
    pub upstream: UpstreamArgs,
    /// Reconciliation flags.
    pub reconcile: ReconcileArgs,
}

/// Runs the serve command until Ctrl-C.
pub fn run(journal: Option<&Path>, options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(journal)?;
    let reconcile = reconcile_config(&options.reconcile, Some(options.interval));
    let reconciler: Arc<SharedReconciler> = Arc::new(Reconciler::new(
        reconcile,
        gateway(&options.upstream),
        store,
    ));

    let config = ServerConfig::new(options.bind).with_inline_sync(options.inline_sync);
    let server = SyncServer::new(HandlerContext::new(config, Arc::clone(&reconciler)));

    tracing::info!(
        upstream = %options.upstream.upstream_url,
        interval_secs = options.interval.as_secs(),
        inline_sync = options.inline_sync,
        "starting possyncd"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let scheduler = ReconcileScheduler::spawn(Arc::clone(&reconciler), options.interval);
        let served = server
            .serve(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested");
            })
            .await;
        scheduler.shutdown().await;
        served
    })?;

    Ok(())
}

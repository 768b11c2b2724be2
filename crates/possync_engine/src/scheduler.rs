//! Periodic reconciliation driver.

use crate::gateway::UpstreamGateway;
use crate::reconcile::Reconciler;
use possync_staging::StagingStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shortest interval the scheduler accepts.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a reconciliation cycle on a fixed interval.
///
/// The first cycle runs one interval after spawning. Intervals below one
/// second are raised to one second. Each cycle runs on the
/// blocking pool and is awaited before the next tick is taken, so cycles
/// never overlap; ticks missed while a cycle runs are delayed rather than
/// bunched up.
pub struct ReconcileScheduler {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ReconcileScheduler {
    /// Spawns the driver on the current tokio runtime.
    pub fn spawn<G, S>(reconciler: Arc<Reconciler<G, S>>, interval: Duration) -> Self
    where
        G: UpstreamGateway + ?Sized + 'static,
        S: StagingStore + ?Sized + 'static,
    {
        if interval < MIN_INTERVAL {
            tracing::warn!(interval = ?interval, "reconcile interval too short, using 1s");
        }
        let interval = interval.max(MIN_INTERVAL);
        let (tx, mut rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "reconcile scheduler started");

            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        let reconciler = Arc::clone(&reconciler);
                        if let Err(e) = tokio::task::spawn_blocking(move || reconciler.run_cycle()).await {
                            tracing::error!(error = %e, "reconciliation cycle panicked");
                        }
                    }
                }
            }
            tracing::info!("reconcile scheduler stopped");
        });

        Self {
            shutdown: Some(tx),
            handle,
        }
    }

    /// Stops the driver, letting a running cycle finish first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::error!(error = %e, "reconcile scheduler task failed");
        }
    }
}

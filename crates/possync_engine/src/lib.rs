//! # POS Sync Engine
//!
//! Upstream gateway client and reconciliation loop for the POS sync
//! middleware.
//!
//! This crate provides:
//! - [`UpstreamGateway`], the upstream record API as a trait
//! - [`HttpGateway`] over a blocking [`HttpClient`] ([`UreqClient`] in
//!   production, [`MockGateway`] for tests)
//! - [`Reconciler`], the per-record state machine
//!   (pending → checking → pushing → synced)
//! - [`ReconcileScheduler`], the periodic tokio driver
//!
//! ## Architecture
//!
//! Terminals only ever write to the staging store. The reconciler pulls
//! pending records from the store in batches, asks the upstream whether each
//! one already exists and pushes the summary and then its lines if not.
//!
//! ## Key Invariants
//!
//! - Records are never pushed twice once confirmed synced
//! - A failed record or line never blocks the rest of a batch
//! - At most one cycle runs at a time
//! - At most one attempt per transaction is in flight
//! - No lock is held across network calls

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod gateway;
mod http;
mod reconcile;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ReconcileConfig, UpstreamConfig};
pub use error::{SyncError, SyncResult};
pub use gateway::{GatewayCall, MockGateway, UpstreamGateway};
pub use http::{HttpClient, HttpGateway, HttpResponse, Method, UreqClient};
pub use reconcile::{CycleReport, ReconcileState, ReconcileStats, Reconciler, RecordOutcome};
pub use scheduler::ReconcileScheduler;

//! # POS Sync Server
//!
//! Terminal-facing HTTP API for the POS sync middleware.
//!
//! This crate provides:
//! - Transaction submission (filter, validate, stage, answer)
//! - Sync status and pending-record views over the staging store
//! - Manual reconciliation trigger
//! - Refund and Z-report endpoints forwarded to the upstream
//!
//! # Architecture
//!
//! Terminals never wait on the upstream when submitting. A submission is
//! canonicalized and staged, the terminal gets its answer, and the record is
//! pushed by a detached inline attempt or by the next reconciliation cycle.
//!
//! The request logic lives in [`RequestHandler`], which is synchronous and
//! transport-agnostic. [`SyncServer`] mounts it on an axum router and runs
//! the blocking parts on tokio's blocking pool.
//!
//! # Routes
//!
//! | method & path | handler |
//! |---|---|
//! | `GET /` | welcome message |
//! | `GET /health` | liveness |
//! | `GET /api/server-time` | server clock |
//! | `POST /api/sync-transactions` | stage a submission |
//! | `GET /api/sync-status/:transactionId` | staged record state |
//! | `GET /api/pending-transactions` | pending records |
//! | `POST /api/sync-transactions/reconcile` | run one cycle now |
//! | `POST /api/transaction-refund/:storeId/:count` | refund upstream |
//! | `POST /api/rbotransactiontables/:storeId/:zReportId` | assign a Z-report |

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{
    HandlerContext, LineStatus, PendingResponse, PendingTransaction, RefundResponse,
    RequestHandler, SharedReconciler, StatusResponse, SubmitResponse, ZReportResponse,
};
pub use server::{router, SyncServer};

//! MovieSync offline-first core
//!
//! This crate keeps a movie catalog usable while its remote service is
//! unreachable:
//! - Connectivity tracking with status notifications
//! - Local mirror of the last fetched collection
//! - Durable log of writes made while disconnected
//! - Ordered replay of that log once the service is back
//! - Periodic probing, with optional replay on reconnect

pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod mirror;
pub mod pending;
pub mod scheduler;
pub mod stats;

// Re-export main types
pub use catalog::{MovieCatalog, ReplayReport};
pub use config::ClientConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal, ConnectivityState, StatusChange};
pub use mirror::LocalMirror;
pub use pending::{OperationKind, OperationPayload, PendingOperation, PendingOperationLog};
pub use scheduler::{ProbeScheduler, ProbeSchedulerHandle, SyncMode};
pub use stats::MovieStatistics;
